//! Quantile models and the ensemble that binds them to a feature schema
//!
//! A [`QuantileEnsemble`] is produced once per training run and is
//! immutable afterwards. Its schema (the training-time column order) is
//! authoritative: a row lacking one of its columns is a contract violation
//! and fails hard, while a row whose columns exist but are unresolved
//! simply has no prediction.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{ForecastError, Result};
use crate::features::{FeatureRow, FeatureTable};
use crate::forecast::ForecastPoint;
use crate::gbm::QuantileGbm;
use crate::series::Timestamp;
use crate::trainer::HyperParams;

/// Quantile level in the open interval (0, 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct QuantileLevel(f64);

impl QuantileLevel {
    pub fn new(value: f64) -> Result<Self> {
        if value > 0.0 && value < 1.0 {
            Ok(Self(value))
        } else {
            Err(ForecastError::InvalidQuantile(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Column label such as `p10` or `p2.5`
    pub fn label(&self) -> String {
        let pct = self.0 * 100.0;
        if (pct - pct.round()).abs() < 1e-9 {
            format!("p{:02}", pct.round() as u32)
        } else {
            format!("p{}", pct)
        }
    }
}

impl Eq for QuantileLevel {}

impl PartialOrd for QuantileLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QuantileLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TryFrom<f64> for QuantileLevel {
    type Error = ForecastError;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QuantileLevel> for f64 {
    fn from(level: QuantileLevel) -> f64 {
        level.0
    }
}

impl fmt::Display for QuantileLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validation score of one grid point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub params: HyperParams,
    /// `None` when fitting this combination failed
    pub validation_mae: Option<f64>,
}

/// How a model's hyperparameters were chosen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSelection {
    pub best: HyperParams,
    pub validation_mae: f64,
    pub candidates: Vec<CandidateScore>,
    pub fit_rows: usize,
    pub validation_rows: usize,
    /// Rows used for the final fit (fit + validation)
    pub training_rows: usize,
}

/// Trained regressor bound to one quantile level
#[derive(Debug, Clone)]
pub struct QuantileModel {
    level: QuantileLevel,
    booster: QuantileGbm,
    selection: ModelSelection,
}

impl QuantileModel {
    pub(crate) fn new(level: QuantileLevel, booster: QuantileGbm, selection: ModelSelection) -> Self {
        Self {
            level,
            booster,
            selection,
        }
    }

    pub fn level(&self) -> QuantileLevel {
        self.level
    }

    pub fn selection(&self) -> &ModelSelection {
        &self.selection
    }

    pub fn booster(&self) -> &QuantileGbm {
        &self.booster
    }

    /// Predict from features in schema order
    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        self.booster.predict(features)
    }
}

/// One model per configured quantile level plus the training schema
#[derive(Debug, Clone)]
pub struct QuantileEnsemble {
    target: String,
    schema: Vec<String>,
    models: Vec<QuantileModel>,
    reference: QuantileLevel,
    cutoff: Timestamp,
}

impl QuantileEnsemble {
    pub(crate) fn new(
        target: impl Into<String>,
        schema: Vec<String>,
        mut models: Vec<QuantileModel>,
        reference: QuantileLevel,
        cutoff: Timestamp,
    ) -> Result<Self> {
        models.sort_by_key(|m| m.level);
        if models.windows(2).any(|w| w[0].level == w[1].level) {
            return Err(ForecastError::InvalidConfig("duplicate quantile level".into()));
        }
        if !models.iter().any(|m| m.level == reference) {
            return Err(ForecastError::UnknownQuantile(reference.value()));
        }
        if let Some(m) = models.iter().find(|m| m.booster.n_features() != schema.len()) {
            return Err(ForecastError::Training(format!(
                "model for {} expects {} features, schema has {}",
                m.level,
                m.booster.n_features(),
                schema.len()
            )));
        }

        Ok(Self {
            target: target.into(),
            schema,
            models,
            reference,
            cutoff,
        })
    }

    /// Name of the series the ensemble was trained on
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn cutoff(&self) -> Timestamp {
        self.cutoff
    }

    /// Level whose prediction feeds back into recursive forecasts
    pub fn reference_level(&self) -> QuantileLevel {
        self.reference
    }

    /// Levels in increasing order
    pub fn levels(&self) -> Vec<QuantileLevel> {
        self.models.iter().map(|m| m.level).collect()
    }

    pub fn models(&self) -> &[QuantileModel] {
        &self.models
    }

    /// Model for a configured level
    pub fn model(&self, level: f64) -> Result<&QuantileModel> {
        self.models
            .iter()
            .find(|m| m.level.value() == level)
            .ok_or(ForecastError::UnknownQuantile(level))
    }

    /// Lay a row out in schema order.
    ///
    /// `Ok(None)` when a schema column is present but unresolved; an error
    /// when a schema column is absent altogether.
    pub fn feature_vector(&self, row: &FeatureRow) -> Result<Option<Vec<f64>>> {
        let mut values = Vec::with_capacity(self.schema.len());
        let mut resolved = true;

        for column in &self.schema {
            match row.get(column) {
                None => {
                    return Err(ForecastError::MissingFeature {
                        column: column.clone(),
                        timestamp: row.timestamp,
                    })
                }
                Some(Some(v)) => values.push(v),
                Some(None) => resolved = false,
            }
        }

        Ok(resolved.then_some(values))
    }

    /// Every level's prediction for one row, or `None` if unresolved
    pub fn predict_row(&self, row: &FeatureRow) -> Result<Option<Vec<(QuantileLevel, f64)>>> {
        let Some(features) = self.feature_vector(row)? else {
            return Ok(None);
        };
        self.models
            .iter()
            .map(|m| Ok((m.level, m.predict(&features)?)))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Prediction of a single configured level
    pub fn predict_level(&self, level: f64, row: &FeatureRow) -> Result<Option<f64>> {
        let model = self.model(level)?;
        self.feature_vector(row)?
            .map(|f| model.predict(&f))
            .transpose()
    }

    /// Score every row of a table; unresolved rows give NaN points
    pub fn predict_table(&self, table: &FeatureTable) -> Result<Vec<ForecastPoint>> {
        let levels = self.levels();
        table
            .rows
            .iter()
            .map(|row| {
                Ok(match self.predict_row(row)? {
                    Some(values) => ForecastPoint::new(row.timestamp, values),
                    None => ForecastPoint::missing(row.timestamp, &levels),
                })
            })
            .collect()
    }
}
