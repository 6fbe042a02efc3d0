//! Configuration for feature derivation, training and preprocessing
//!
//! Every section has defaults, so an empty file (or no file at all) yields
//! the standard setup: lags 1/24/168, quantiles 0.1/0.5/0.9 and the eight
//! point hyperparameter grid.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::gbm::MAX_BINS;
use crate::trainer::HyperParams;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,
}

impl Config {
    /// Load from an optional TOML file, overridden by `QF__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("QF")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("features.lags")
                    .with_list_parse_key("training.quantiles"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.training.validate()
    }
}

/// Lag and rolling-window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Lag offsets in hours
    #[serde(default = "default_lags")]
    pub lags: Vec<u32>,
    /// Trailing window length (hours) for rolling mean/std
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
}

/// Longest lag or rolling window accepted, ten years of hours
pub const MAX_LOOKBACK_HOURS: usize = 10 * 366 * 24;

fn default_lags() -> Vec<u32> {
    vec![1, 24, 168]
}

fn default_rolling_window() -> usize {
    24
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lags: default_lags(),
            rolling_window: default_rolling_window(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lags.is_empty() {
            return Err(ForecastError::InvalidConfig("at least one lag is required".into()));
        }
        if self.lags.contains(&0) {
            return Err(ForecastError::InvalidConfig(
                "lag 0 would expose the target to its own features".into(),
            ));
        }
        if let Some(&lag) = self.lags.iter().find(|&&l| l as usize > MAX_LOOKBACK_HOURS) {
            return Err(ForecastError::InvalidConfig(format!(
                "lag {} exceeds the {} hour limit",
                lag, MAX_LOOKBACK_HOURS
            )));
        }
        if self.rolling_window > MAX_LOOKBACK_HOURS {
            return Err(ForecastError::InvalidConfig(format!(
                "rolling_window {} exceeds the {} hour limit",
                self.rolling_window, MAX_LOOKBACK_HOURS
            )));
        }
        if self.rolling_window < 2 {
            return Err(ForecastError::InvalidConfig(format!(
                "rolling_window must be at least 2, got {}",
                self.rolling_window
            )));
        }
        Ok(())
    }
}

/// Hyperparameter values searched for every quantile level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamGrid {
    #[serde(default = "default_num_leaves")]
    pub num_leaves: Vec<usize>,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: Vec<f64>,
    #[serde(default = "default_min_data_in_leaf")]
    pub min_data_in_leaf: Vec<usize>,
}

fn default_num_leaves() -> Vec<usize> {
    vec![15, 31]
}

fn default_learning_rate() -> Vec<f64> {
    vec![0.01, 0.05]
}

fn default_min_data_in_leaf() -> Vec<usize> {
    vec![10, 20]
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            num_leaves: default_num_leaves(),
            learning_rate: default_learning_rate(),
            min_data_in_leaf: default_min_data_in_leaf(),
        }
    }
}

impl ParamGrid {
    /// Number of combinations the grid expands to
    pub fn len(&self) -> usize {
        self.num_leaves.len() * self.learning_rate.len() * self.min_data_in_leaf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination, num_leaves outermost and min_data_in_leaf innermost
    pub fn combinations(&self) -> Vec<HyperParams> {
        let mut combos = Vec::with_capacity(self.len());
        for &num_leaves in &self.num_leaves {
            for &learning_rate in &self.learning_rate {
                for &min_data_in_leaf in &self.min_data_in_leaf {
                    combos.push(HyperParams {
                        num_leaves,
                        learning_rate,
                        min_data_in_leaf,
                    });
                }
            }
        }
        combos
    }
}

/// Quantile ensemble training settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_quantiles")]
    pub quantiles: Vec<f64>,
    /// Level whose prediction is fed back into the series during forecasting
    #[serde(default = "default_reference_quantile")]
    pub reference_quantile: f64,
    /// Share of training rows held out for model selection
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Boosting rounds per model
    #[serde(default = "default_n_rounds")]
    pub n_rounds: usize,
    /// Upper bound on histogram bins per feature
    #[serde(default = "default_max_bins")]
    pub max_bins: usize,
    /// Search quantile levels on the rayon pool
    #[serde(default = "default_true")]
    pub parallel: bool,
    #[serde(default)]
    pub grid: ParamGrid,
}

fn default_quantiles() -> Vec<f64> {
    vec![0.1, 0.5, 0.9]
}

fn default_reference_quantile() -> f64 {
    0.5
}

fn default_validation_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_n_rounds() -> usize {
    200
}

fn default_max_bins() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            quantiles: default_quantiles(),
            reference_quantile: default_reference_quantile(),
            validation_fraction: default_validation_fraction(),
            seed: default_seed(),
            n_rounds: default_n_rounds(),
            max_bins: default_max_bins(),
            parallel: true,
            grid: ParamGrid::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.quantiles.is_empty() {
            return Err(ForecastError::InvalidConfig("at least one quantile is required".into()));
        }
        for &q in &self.quantiles {
            if !(q > 0.0 && q < 1.0) {
                return Err(ForecastError::InvalidQuantile(q));
            }
        }
        if !self.quantiles.contains(&self.reference_quantile) {
            return Err(ForecastError::InvalidConfig(format!(
                "reference_quantile {} is not among the configured quantiles",
                self.reference_quantile
            )));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "validation_fraction must lie in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        if self.n_rounds == 0 {
            return Err(ForecastError::InvalidConfig("n_rounds must be positive".into()));
        }
        if self.max_bins < 2 || self.max_bins > MAX_BINS {
            return Err(ForecastError::InvalidConfig(format!(
                "max_bins must lie in [2, {}], got {}",
                MAX_BINS, self.max_bins
            )));
        }
        if self.grid.is_empty() {
            return Err(ForecastError::InvalidConfig("hyperparameter grid is empty".into()));
        }
        if self.grid.num_leaves.iter().any(|&n| n < 2) {
            return Err(ForecastError::InvalidConfig("num_leaves must be at least 2".into()));
        }
        if self.grid.min_data_in_leaf.contains(&0) {
            return Err(ForecastError::InvalidConfig("min_data_in_leaf must be positive".into()));
        }
        if self.grid.learning_rate.iter().any(|&lr| !(lr > 0.0 && lr.is_finite())) {
            return Err(ForecastError::InvalidConfig("learning rates must be positive".into()));
        }
        Ok(())
    }
}

/// Caller-side cleanup applied before training
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Imputation method name ("forward-fill", "backward-fill", "mean", "median")
    #[serde(default)]
    pub impute: Option<String>,
}
