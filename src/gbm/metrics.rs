//! Error metrics and order statistics

/// Mean absolute error; `None` for empty or mismatched inputs
pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> Option<f64> {
    let n = y_true.len();
    if n == 0 || n != y_pred.len() {
        return None;
    }
    let total: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum();
    Some(total / n as f64)
}

/// Pinball (quantile) loss of a single prediction at level `alpha`
pub fn pinball_loss(y_true: f64, y_pred: f64, alpha: f64) -> f64 {
    let diff = y_true - y_pred;
    if diff >= 0.0 {
        alpha * diff
    } else {
        (alpha - 1.0) * diff
    }
}

/// Mean pinball loss; `None` for empty or mismatched inputs
pub fn mean_pinball_loss(y_true: &[f64], y_pred: &[f64], alpha: f64) -> Option<f64> {
    let n = y_true.len();
    if n == 0 || n != y_pred.len() {
        return None;
    }
    let total: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(&t, &p)| pinball_loss(t, p, alpha))
        .sum();
    Some(total / n as f64)
}

/// Empirical quantile with linear interpolation between order statistics
pub fn empirical_quantile(values: &[f64], alpha: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = alpha.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
