//! Error types for the forecasting engine

use thiserror::Error;

use crate::series::Timestamp;

/// Errors raised by training, prediction and the surrounding plumbing
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Insufficient training history: no valid feature rows before cutoff {cutoff} ({candidates} rows built)")]
    InsufficientHistory { cutoff: Timestamp, candidates: usize },

    #[error("Feature row at {timestamp} is missing schema column '{column}'")]
    MissingFeature { column: String, timestamp: Timestamp },

    #[error("Expected {expected} feature values, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("Quantile level {0} is not part of this ensemble")]
    UnknownQuantile(f64),

    #[error("Quantile level must lie strictly between 0 and 1, got {0}")]
    InvalidQuantile(f64),

    #[error("Invalid time series: {0}")]
    InvalidSeries(String),

    #[error("Invalid forecast window: start {start} is after end {end}")]
    InvalidWindow { start: Timestamp, end: Timestamp },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unsupported imputation method: {0}")]
    UnsupportedImputation(String),

    #[error("Duplicate observation for code '{code}' at {timestamp}")]
    DuplicateObservation { code: String, timestamp: Timestamp },

    #[error("Every hyperparameter combination failed for quantile {level}")]
    NoViableCandidate { level: f64 },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
