use super::{lead, Series};

/// Smoothing constant `2 / (period + 1)`.
pub fn ema_multiplier(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// One-step EMA blending each close with the *next* close:
/// `K * close[i] + (1 - K) * close[i + 1]`.
///
/// Kept for parity with the published EMA column, lag direction included.
/// It looks one period ahead, so the column stays out of the model feature
/// roster. The last position is undefined.
pub fn lagged_ema(closes: &[f64], period: usize) -> Series {
    let k = ema_multiplier(period);
    closes
        .iter()
        .zip(lead(closes))
        .map(|(close, next)| next.map(|next| close * k + next * (1.0 - k)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_multiplier() {
        assert!((ema_multiplier(4) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_lagged_ema_blends_next_value() {
        let out = lagged_ema(&[10.0, 20.0, 30.0], 4);
        assert_eq!(out.len(), 3);
        assert!((out[0].unwrap() - (10.0 * 0.4 + 20.0 * 0.6)).abs() < 1e-12);
        assert!((out[1].unwrap() - (20.0 * 0.4 + 30.0 * 0.6)).abs() < 1e-12);
        assert_eq!(out[2], None);
    }
}
