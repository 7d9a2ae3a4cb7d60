use super::{defined, rolling, rolling_forward, Series};

const SLOPE_EPSILON: f64 = 0.001;
const BASE_EPSILON: f64 = 0.01;

/// Least-squares line through `(i, values[i])`, returned as `(slope, intercept)`.
///
/// Uses raw sums of squares and cross products, with a small epsilon on the
/// variance so a single point gives a flat line instead of a division by zero.
pub fn ols_coefficients(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let (mut covariance, mut variance) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        covariance += dx * (y - y_mean);
        variance += dx * dx;
    }

    let slope = covariance / (variance + SLOPE_EPSILON);
    Some((slope, y_mean - slope * x_mean))
}

/// Percentage change of the fitted line between the first and last point.
pub fn trend_score(values: &[f64]) -> Option<f64> {
    let (slope, intercept) = ols_coefficients(values)?;
    let first = intercept;
    let last = slope * (values.len() - 1) as f64 + intercept;
    let score = (last - first) / (first + BASE_EPSILON) * 100.0;
    score.is_finite().then_some(score)
}

/// Trend over the `hours` opens ending at each row.
pub fn past_trend(opens: &[f64], hours: usize) -> Series {
    rolling(&defined(opens), hours, trend_score)
}

/// Trend over the `hours` opens starting at each row. Looks ahead, so only
/// usable as a label.
pub fn future_trend(opens: &[f64], hours: usize) -> Series {
    rolling_forward(&defined(opens), hours, trend_score)
}

/// 1.0 for a non-negative trend, 0.0 otherwise. Undefined trends flag as 0.0.
pub fn trend_flag(scores: &[Option<f64>]) -> Series {
    scores
        .iter()
        .map(|s| Some(if s.is_some_and(|s| s >= 0.0) { 1.0 } else { 0.0 }))
        .collect()
}
