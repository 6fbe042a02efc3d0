//! Hourly Quantile Forecaster
//!
//! Trains one gradient-boosted model per quantile level on lag, rolling and
//! calendar features of an hourly series, then forecasts a window
//! recursively by feeding the median back in as history.
//!
//! ## Architecture
//!
//! ```text
//! Observations → pivot/impute → TimeSeries → FeatureBuilder → FeatureTable
//!                                                                 ↓
//!                         QuantileEnsembleTrainer (grid search per level, rayon)
//!                                                                 ↓
//!                  RecursiveForecaster ← QuantileEnsemble (schema + boosters)
//!                          ↓
//!                  Forecast (p10 / p50 / p90 per hour)
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod gbm;
pub mod impute;
pub mod model;
pub mod series;
pub mod trainer;

pub use config::Config;
pub use error::{ForecastError, Result};
pub use features::{FeatureBuilder, FeatureRow, FeatureTable};
pub use forecast::{Forecast, ForecastPoint, RecursiveForecaster};
pub use model::{QuantileEnsemble, QuantileLevel, QuantileModel};
pub use series::{BoundaryTimestamp, TimeSeries, Timestamp};
pub use trainer::QuantileEnsembleTrainer;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod integration_tests;
