//! Quantile ensemble training
//!
//! For every configured quantile level, independently:
//! 1. split the pre-cutoff rows into fit/validation with a seeded shuffle
//! 2. fit one booster per grid point on the fit rows and score it by MAE
//!    on the validation rows
//! 3. refit the winning grid point on all pre-cutoff rows
//!
//! Levels share nothing but the read-only training matrix, so they are
//! searched on the rayon pool when `parallel` is set.
//!
//! The split is a shuffled holdout, not a rolling-origin scheme; validation
//! rows are interleaved in time with fit rows, which makes the selection
//! score optimistic for autoregressive use.


use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{Config, FeatureConfig, TrainingConfig};
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureTable};
use crate::gbm::metrics::mean_absolute_error;
use crate::gbm::{GbmParams, QuantileGbm};
use crate::model::{CandidateScore, ModelSelection, QuantileEnsemble, QuantileLevel, QuantileModel};
use crate::series::{normalize_timestamp, BoundaryTimestamp, TimeSeries, Timestamp};

/// One point of the hyperparameter grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub num_leaves: usize,
    pub learning_rate: f64,
    pub min_data_in_leaf: usize,
}

/// Pre-cutoff training matrix
#[derive(Debug, Clone)]
struct TrainingData {
    x: Vec<Vec<f64>>,
    y: Vec<f64>,
}

impl TrainingData {
    fn subset(&self, indices: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
        (
            indices.iter().map(|&i| self.x[i].clone()).collect(),
            indices.iter().map(|&i| self.y[i]).collect(),
        )
    }
}

/// Deterministic fit/validation partition of `n` rows.
///
/// Returns `(fit, validation)` index lists, each in ascending order.
pub fn validation_split(n: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_val = ((n as f64) * fraction).ceil() as usize;
    let n_val = n_val.min(n);
    let mut validation = indices[..n_val].to_vec();
    let mut fit = indices[n_val..].to_vec();
    validation.sort_unstable();
    fit.sort_unstable();
    (fit, validation)
}

/// Searches and fits one model per quantile level
#[derive(Debug, Clone)]
pub struct QuantileEnsembleTrainer {
    features: FeatureBuilder,
    config: TrainingConfig,
    levels: Vec<QuantileLevel>,
    reference: QuantileLevel,
}

impl QuantileEnsembleTrainer {
    pub fn new(feature_config: &FeatureConfig, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let features = FeatureBuilder::new(feature_config)?;

        let mut levels = config
            .quantiles
            .iter()
            .map(|&q| QuantileLevel::new(q))
            .collect::<Result<Vec<_>>>()?;
        levels.sort();
        levels.dedup();
        let reference = QuantileLevel::new(config.reference_quantile)?;

        Ok(Self {
            features,
            config,
            levels,
            reference,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.features, config.training.clone())
    }

    pub fn feature_builder(&self) -> &FeatureBuilder {
        &self.features
    }

    pub fn levels(&self) -> &[QuantileLevel] {
        &self.levels
    }

    /// Build features from `series` and train on rows before `cutoff`
    pub fn train(
        &self,
        series: &TimeSeries,
        cutoff: impl Into<BoundaryTimestamp>,
    ) -> Result<QuantileEnsemble> {
        let cutoff = normalize_timestamp(cutoff.into(), series.offset());
        let table = self.features.build(series);
        self.train_table(&table, series.name(), cutoff)
    }

    /// Train on the valid rows of `table` that precede `cutoff`
    pub fn train_table(
        &self,
        table: &FeatureTable,
        target: &str,
        cutoff: Timestamp,
    ) -> Result<QuantileEnsemble> {
        let data = self.training_data(table, cutoff)?;
        let (fit, validation) = validation_split(
            data.y.len(),
            self.config.validation_fraction,
            self.config.seed,
        );

        tracing::info!(
            "Training {} quantile models for '{}' on {} rows before {} ({} fit / {} validation, {} grid points)",
            self.levels.len(),
            target,
            data.y.len(),
            cutoff,
            fit.len(),
            validation.len(),
            self.config.grid.len()
        );

        let models = if self.config.parallel {
            self.levels
                .par_iter()
                .map(|&level| self.train_level(level, &data, &fit, &validation))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.levels
                .iter()
                .map(|&level| self.train_level(level, &data, &fit, &validation))
                .collect::<Result<Vec<_>>>()?
        };

        QuantileEnsemble::new(target, table.columns.clone(), models, self.reference, cutoff)
    }

    fn training_data(&self, table: &FeatureTable, cutoff: Timestamp) -> Result<TrainingData> {
        let mut x = Vec::new();
        let mut y = Vec::new();

        for row in table.valid_rows().filter(|r| r.timestamp < cutoff) {
            let mut features = Vec::with_capacity(table.columns.len());
            for column in &table.columns {
                let value = row.value(column).ok_or_else(|| ForecastError::MissingFeature {
                    column: column.clone(),
                    timestamp: row.timestamp,
                })?;
                features.push(value);
            }
            if let Some(target) = row.target {
                x.push(features);
                y.push(target);
            }
        }

        if y.is_empty() {
            return Err(ForecastError::InsufficientHistory {
                cutoff,
                candidates: table.len(),
            });
        }

        Ok(TrainingData { x, y })
    }

    fn gbm_params(&self, params: &HyperParams) -> GbmParams {
        GbmParams {
            num_leaves: params.num_leaves,
            learning_rate: params.learning_rate,
            min_data_in_leaf: params.min_data_in_leaf,
            n_rounds: self.config.n_rounds,
            max_bins: self.config.max_bins,
        }
    }

    fn train_level(
        &self,
        level: QuantileLevel,
        data: &TrainingData,
        fit: &[usize],
        validation: &[usize],
    ) -> Result<QuantileModel> {
        let alpha = level.value();

        // Too few rows to hold any out: score on the full set
        let all: Vec<usize> = (0..data.y.len()).collect();
        let (fit, validation) = if fit.is_empty() || validation.is_empty() {
            (all.as_slice(), all.as_slice())
        } else {
            (fit, validation)
        };
        let (fit_x, fit_y) = data.subset(fit);
        let (val_x, val_y) = data.subset(validation);

        let mut candidates = Vec::with_capacity(self.config.grid.len());
        let mut best: Option<(HyperParams, f64)> = None;

        for params in self.config.grid.combinations() {
            let predictions = QuantileGbm::fit(&fit_x, &fit_y, alpha, &self.gbm_params(&params))
                .and_then(|model| model.predict_many(&val_x));
            let score = match predictions {
                Ok(predictions) => mean_absolute_error(&val_y, &predictions),
                Err(e) => {
                    tracing::warn!("Quantile {} grid point {:?} failed: {}", level, params, e);
                    None
                }
            };

            if let Some(mae) = score {
                tracing::debug!("Quantile {} {:?}: validation MAE {:.6}", level, params, mae);
                if best.map_or(true, |(_, best_mae)| mae < best_mae) {
                    best = Some((params, mae));
                }
            }
            candidates.push(CandidateScore {
                params,
                validation_mae: score,
            });
        }

        let (best_params, best_mae) = best.ok_or(ForecastError::NoViableCandidate { level: alpha })?;
        let booster = QuantileGbm::fit(&data.x, &data.y, alpha, &self.gbm_params(&best_params))?;

        tracing::info!(
            "Quantile {}: best {:?} (validation MAE {:.6}), refit on {} rows",
            level,
            best_params,
            best_mae,
            data.y.len()
        );

        Ok(QuantileModel::new(
            level,
            booster,
            ModelSelection {
                best: best_params,
                validation_mae: best_mae,
                candidates,
                fit_rows: fit.len(),
                validation_rows: validation.len(),
                training_rows: data.y.len(),
            },
        ))
    }
}
