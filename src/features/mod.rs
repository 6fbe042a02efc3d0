//! Feature derivation from a raw hourly series
//!
//! For a target hour `t` the builder produces:
//! - calendar fields of `t` in the series' offset (`hour`, `dayofweek`,
//!   `month`, `is_weekend`)
//! - `lag_L`: the value at `t - L` hours for every configured lag
//! - `rolling_mean_W` / `rolling_std_W`: statistics over the values at
//!   `t-1 .. t-W` hours, never including `t` itself
//!
//! Lag and rolling inputs are looked up by timestamp, so a gap (or a NaN)
//! anywhere in the window leaves the feature unresolved. Unresolved rows
//! are excluded from training and yield no prediction when forecasting.

use chrono::{Datelike, Duration, Timelike};
use serde::Serialize;

use crate::config::FeatureConfig;
use crate::error::Result;
use crate::series::{TimeSeries, Timestamp};

pub const CALENDAR_FEATURES: [&str; 4] = ["hour", "dayofweek", "month", "is_weekend"];

/// Single named feature value; `None` when its inputs are missing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    pub name: String,
    pub value: Option<f64>,
}

/// Features for one target timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub timestamp: Timestamp,
    pub features: Vec<Feature>,
    /// Observed target at `timestamp`, when known
    pub target: Option<f64>,
}

impl FeatureRow {
    /// Outer `None`: no such column. Inner `None`: column unresolved.
    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.features
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value)
    }

    /// Resolved value of a column
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).flatten()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// Every feature resolved to a real number
    pub fn is_resolved(&self) -> bool {
        self.features.iter().all(|f| f.value.is_some())
    }

    pub fn unresolved(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|f| f.value.is_none())
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Usable as a training example
    pub fn is_trainable(&self) -> bool {
        self.is_resolved() && self.target.is_some()
    }
}

/// Ordered feature rows with a shared column list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with every feature and the target resolved
    pub fn valid_rows(&self) -> impl Iterator<Item = &FeatureRow> {
        self.rows.iter().filter(|r| r.is_trainable())
    }

    pub fn valid_count(&self) -> usize {
        self.valid_rows().count()
    }

    pub fn row(&self, timestamp: &Timestamp) -> Option<&FeatureRow> {
        self.rows.iter().find(|r| &r.timestamp == timestamp)
    }
}

/// Derives feature rows from a series
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    lags: Vec<u32>,
    rolling_window: usize,
}

impl FeatureBuilder {
    pub fn new(config: &FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lags: config.lags.clone(),
            rolling_window: config.rolling_window,
        })
    }

    pub fn lags(&self) -> &[u32] {
        &self.lags
    }

    pub fn rolling_window(&self) -> usize {
        self.rolling_window
    }

    /// Hours of history a row needs before every feature can resolve
    pub fn max_lookback(&self) -> usize {
        let max_lag = self.lags.iter().copied().max().unwrap_or(0) as usize;
        max_lag.max(self.rolling_window)
    }

    /// Column names in schema order
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = CALENDAR_FEATURES.iter().map(|s| s.to_string()).collect();
        columns.extend(self.lags.iter().map(|lag| format!("lag_{lag}")));
        columns.push(format!("rolling_mean_{}", self.rolling_window));
        columns.push(format!("rolling_std_{}", self.rolling_window));
        columns
    }

    /// One row per timestamp of `series`
    pub fn build(&self, series: &TimeSeries) -> FeatureTable {
        let rows: Vec<FeatureRow> = series
            .timestamps()
            .map(|ts| self.row_at(series, ts))
            .collect();

        tracing::debug!(
            "Built {} feature rows for '{}' ({} resolved)",
            rows.len(),
            series.name(),
            rows.iter().filter(|r| r.is_resolved()).count()
        );

        FeatureTable {
            columns: self.columns(),
            rows,
        }
    }

    /// Row for any timestamp, whether or not `series` holds a value there
    pub fn row_at(&self, series: &TimeSeries, timestamp: Timestamp) -> FeatureRow {
        let local = timestamp.with_timezone(&series.offset());
        let dayofweek = local.weekday().num_days_from_monday();

        let mut features = Vec::with_capacity(CALENDAR_FEATURES.len() + self.lags.len() + 2);
        features.push(feature("hour", Some(local.hour() as f64)));
        features.push(feature("dayofweek", Some(dayofweek as f64)));
        features.push(feature("month", Some(local.month() as f64)));
        features.push(feature("is_weekend", Some(if dayofweek >= 5 { 1.0 } else { 0.0 })));

        for &lag in &self.lags {
            let value = hours_before(local, lag as i64).and_then(|source| series.get(&source));
            features.push(feature(&format!("lag_{lag}"), value));
        }

        let (mean, std) = self.rolling_stats(series, local);
        features.push(feature(&format!("rolling_mean_{}", self.rolling_window), mean));
        features.push(feature(&format!("rolling_std_{}", self.rolling_window), std));

        FeatureRow {
            timestamp: local,
            features,
            target: series.get(&local),
        }
    }

    /// Mean and sample standard deviation of the trailing window
    fn rolling_stats(&self, series: &TimeSeries, timestamp: Timestamp) -> (Option<f64>, Option<f64>) {
        // Every value must exist, so the window can never outgrow the series
        let mut window = Vec::with_capacity(self.rolling_window.min(series.len()));
        for offset in 1..=self.rolling_window {
            match hours_before(timestamp, offset as i64).and_then(|ts| series.get(&ts)) {
                Some(v) => window.push(v),
                None => return (None, None),
            }
        }

        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (Some(mean), Some(variance.sqrt()))
    }
}

/// `None` when the result falls outside chrono's representable range
fn hours_before(timestamp: Timestamp, hours: i64) -> Option<Timestamp> {
    timestamp.checked_sub_signed(Duration::try_hours(hours)?)
}

fn feature(name: &str, value: Option<f64>) -> Feature {
    Feature {
        name: name.to_string(),
        value,
    }
}
