//! Shared fixtures for unit and integration tests

use chrono::{DateTime, Duration};

use crate::config::{Config, FeatureConfig, ParamGrid, TrainingConfig};
use crate::series::{TimeSeries, Timestamp};

/// Monday 2024-01-01 00:00 UTC
pub(crate) fn base() -> Timestamp {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap()
}

pub(crate) fn at_hour(h: i64) -> Timestamp {
    base() + Duration::hours(h)
}

/// Deterministic noise in [-1, 1)
pub(crate) fn noise(i: usize) -> f64 {
    ((i * 7919 + 17) % 1000) as f64 / 500.0 - 1.0
}

/// Daily and weekly seasonality on a level of 100, with mild noise
pub(crate) fn synthetic_series(hours: usize) -> TimeSeries {
    let values = (0..hours).map(|i| {
        let daily = (i as f64 * std::f64::consts::TAU / 24.0).sin() * 10.0;
        let weekly = (i as f64 * std::f64::consts::TAU / 168.0).cos() * 4.0;
        100.0 + daily + weekly + noise(i) * 2.0
    });
    TimeSeries::hourly("load", base(), values)
}

/// Small grid and few rounds so debug builds stay fast
pub(crate) fn quick_training() -> TrainingConfig {
    TrainingConfig {
        n_rounds: 15,
        max_bins: 32,
        grid: ParamGrid {
            num_leaves: vec![4, 8],
            learning_rate: vec![0.1, 0.3],
            min_data_in_leaf: vec![5],
        },
        ..TrainingConfig::default()
    }
}

pub(crate) fn quick_config(lags: Vec<u32>) -> Config {
    Config {
        features: FeatureConfig {
            lags,
            rolling_window: 24,
        },
        training: quick_training(),
        ..Config::default()
    }
}
