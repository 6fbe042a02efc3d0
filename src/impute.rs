//! Missing-value imputation applied by callers before training

use std::fmt;
use std::str::FromStr;

use crate::error::{ForecastError, Result};
use crate::series::TimeSeries;

/// Strategy used to fill NaN values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImputeMethod {
    ForwardFill,
    BackwardFill,
    Mean,
    Median,
}

impl FromStr for ImputeMethod {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forward-fill" => Ok(ImputeMethod::ForwardFill),
            "backward-fill" => Ok(ImputeMethod::BackwardFill),
            "mean" => Ok(ImputeMethod::Mean),
            "median" => Ok(ImputeMethod::Median),
            other => {
                tracing::error!("Unsupported NaN handling method: {}", other);
                Err(ForecastError::UnsupportedImputation(other.to_string()))
            }
        }
    }
}

impl fmt::Display for ImputeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImputeMethod::ForwardFill => "forward-fill",
            ImputeMethod::BackwardFill => "backward-fill",
            ImputeMethod::Mean => "mean",
            ImputeMethod::Median => "median",
        };
        f.write_str(name)
    }
}

/// Return a copy of `series` with NaN values filled by `method`.
///
/// Forward-fill leaves leading gaps and backward-fill trailing gaps; mean
/// and median leave an all-missing series untouched.
pub fn impute(series: &TimeSeries, method: ImputeMethod) -> TimeSeries {
    if series.missing_count() == 0 {
        return series.clone();
    }

    tracing::info!(
        "Handling NaNs in series '{}' using method '{}'",
        series.name(),
        method
    );

    let mut values = series.values();
    match method {
        ImputeMethod::ForwardFill => fill_forward(&mut values),
        ImputeMethod::BackwardFill => {
            values.reverse();
            fill_forward(&mut values);
            values.reverse();
        }
        ImputeMethod::Mean => {
            let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
            if !finite.is_empty() {
                let mean = finite.iter().sum::<f64>() / finite.len() as f64;
                fill_constant(&mut values, mean);
            }
        }
        ImputeMethod::Median => {
            let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
            if !finite.is_empty() {
                finite.sort_by(f64::total_cmp);
                let mid = finite.len() / 2;
                let median = if finite.len() % 2 == 0 {
                    (finite[mid - 1] + finite[mid]) / 2.0
                } else {
                    finite[mid]
                };
                fill_constant(&mut values, median);
            }
        }
    }

    series.with_values(values)
}

fn fill_forward(values: &mut [f64]) {
    let mut last: Option<f64> = None;
    for v in values.iter_mut() {
        if v.is_finite() {
            last = Some(*v);
        } else if let Some(prev) = last {
            *v = prev;
        }
    }
}

fn fill_constant(values: &mut [f64], fill: f64) {
    for v in values.iter_mut().filter(|v| !v.is_finite()) {
        *v = fill;
    }
}
