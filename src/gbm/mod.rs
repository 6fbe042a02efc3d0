//! Gradient-boosted quantile regression
//!
//! Trees are grown leaf-wise on histogram-binned features against the
//! gradient of the pinball loss. After each tree is grown its leaf outputs
//! are replaced by the `alpha`-quantile of the residuals that fall into the
//! leaf, so every round moves the ensemble toward the conditional quantile
//! rather than the mean.

mod binning;
pub mod metrics;
mod tree;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use binning::BinnedMatrix;
use metrics::empirical_quantile;
use tree::{Tree, TreeGrower};

/// Upper bound on histogram bins per feature; bin indices are stored as `u16`
pub const MAX_BINS: usize = u16::MAX as usize + 1;

/// Booster hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    /// Maximum leaves per tree
    pub num_leaves: usize,
    /// Shrinkage applied to every tree's output
    pub learning_rate: f64,
    /// Minimum training rows per leaf
    pub min_data_in_leaf: usize,
    /// Boosting iterations
    pub n_rounds: usize,
    /// Histogram bins per feature
    pub max_bins: usize,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            num_leaves: 31,
            learning_rate: 0.05,
            min_data_in_leaf: 20,
            n_rounds: 200,
            max_bins: 64,
        }
    }
}

/// Fitted booster for one quantile level
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileGbm {
    alpha: f64,
    init: f64,
    n_features: usize,
    trees: Vec<Tree>,
}

impl QuantileGbm {
    /// Fit on row-major features `x` and targets `y`
    pub fn fit(x: &[Vec<f64>], y: &[f64], alpha: f64, params: &GbmParams) -> Result<Self> {
        if x.is_empty() {
            return Err(ForecastError::Training("empty training matrix".into()));
        }
        if x.len() != y.len() {
            return Err(ForecastError::Training(format!(
                "{} feature rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(ForecastError::Training("ragged feature matrix".into()));
        }
        if x.iter().flatten().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::Training("non-finite value in training data".into()));
        }
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ForecastError::InvalidQuantile(alpha));
        }
        if params.num_leaves < 2 || params.min_data_in_leaf == 0 || params.learning_rate <= 0.0 {
            return Err(ForecastError::Training(format!("invalid parameters {params:?}")));
        }

        let init = empirical_quantile(y, alpha)
            .ok_or_else(|| ForecastError::Training("no targets".into()))?;
        let data = BinnedMatrix::new(x, params.max_bins.max(2));
        let grower = TreeGrower::new(&data, params.num_leaves, params.min_data_in_leaf);

        let n = y.len();
        let mut predictions = vec![init; n];
        let mut gradients = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_rounds);

        for _ in 0..params.n_rounds {
            for i in 0..n {
                gradients[i] = if y[i] - predictions[i] >= 0.0 { -alpha } else { 1.0 - alpha };
            }

            let (mut tree, leaves) = grower.grow(&gradients, (0..n).collect());
            for leaf in &leaves {
                let residuals: Vec<f64> = leaf.rows.iter().map(|&r| y[r] - predictions[r]).collect();
                let output = empirical_quantile(&residuals, alpha).unwrap_or(0.0) * params.learning_rate;
                tree.set_leaf(leaf.node, output);
                for &r in &leaf.rows {
                    predictions[r] += output;
                }
            }
            trees.push(tree);
        }

        tracing::trace!(
            "Fitted quantile booster alpha={} on {} rows: {} trees, {} leaves",
            alpha,
            n,
            trees.len(),
            trees.iter().map(|t| t.n_leaves()).sum::<usize>()
        );

        Ok(Self {
            alpha,
            init,
            n_features,
            trees,
        })
    }

    /// Predict a single row laid out in training column order
    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.n_features {
            return Err(ForecastError::FeatureCount {
                expected: self.n_features,
                actual: features.len(),
            });
        }
        Ok(self.init + self.trees.iter().map(|t| t.predict(features)).sum::<f64>())
    }

    pub fn predict_many(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
