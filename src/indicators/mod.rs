//! Column-wise technical indicators over an ordered price series.
//!
//! Every function returns one value per input position. Positions without
//! enough history (or, for the forward-looking helpers, enough future) are
//! `None`.

pub mod ema;
pub mod rsi;
pub mod bollinger;
pub mod donchian;
pub mod volume;
pub mod trend;

pub use ema::*;
pub use rsi::*;
pub use bollinger::*;
pub use donchian::*;
pub use volume::*;
pub use trend::*;

/// One indicator value per candle; `None` where undefined.
pub type Series = Vec<Option<f64>>;

/// Applies `f` to every full trailing window of `period` values.
///
/// A window that contains an undefined value yields `None`, as do the first
/// `period - 1` positions.
pub fn rolling<F>(values: &[Option<f64>], period: usize, f: F) -> Series
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let mut buf = Vec::with_capacity(period);
    for end in (period - 1)..values.len() {
        buf.clear();
        buf.extend(values[end + 1 - period..=end].iter().map_while(|v| *v));
        if buf.len() == period {
            out[end] = f(&buf).filter(|v| v.is_finite());
        }
    }
    out
}

/// Same as [`rolling`] but the window starts at each position and looks ahead.
pub fn rolling_forward<F>(values: &[Option<f64>], period: usize, f: F) -> Series
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut buf = Vec::with_capacity(period);
    for start in 0..=(values.len() - period) {
        buf.clear();
        buf.extend(values[start..start + period].iter().map_while(|v| *v));
        if buf.len() == period {
            out[start] = f(&buf).filter(|v| v.is_finite());
        }
    }
    out
}

pub fn defined(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().map(|v| Some(*v)).collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn stddev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

pub fn sma(values: &[f64], period: usize) -> Series {
    rolling(&defined(values), period, mean)
}

pub fn rolling_sum(values: &[f64], period: usize) -> Series {
    rolling(&defined(values), period, |w| Some(w.iter().sum()))
}

pub fn highest(values: &[f64], period: usize) -> Series {
    rolling(&defined(values), period, |w| w.iter().copied().reduce(f64::max))
}

pub fn lowest(values: &[f64], period: usize) -> Series {
    rolling(&defined(values), period, |w| w.iter().copied().reduce(f64::min))
}

pub fn rolling_stddev(values: &[f64], period: usize) -> Series {
    rolling(&defined(values), period, stddev)
}

/// Value of the next position (`values[i + 1]`); the last position is `None`.
pub fn lead(values: &[f64]) -> Series {
    (0..values.len()).map(|i| values.get(i + 1).copied()).collect()
}

/// Element-wise combination of two series; `None` if either side is.
pub fn zip_with<F>(a: &[Option<f64>], b: &[Option<f64>], f: F) -> Series
where
    F: Fn(f64, f64) -> f64,
{
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(f(*x, *y)).filter(|v| v.is_finite()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_leading_undefined() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&values, 3);
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_short_input_is_all_undefined() {
        assert!(sma(&[1.0, 2.0], 4).iter().all(Option::is_none));
        assert!(highest(&[], 4).is_empty());
    }

    #[test]
    fn test_highest_lowest() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_eq!(highest(&values, 2), vec![None, Some(3.0), Some(4.0), Some(4.0), Some(5.0)]);
        assert_eq!(lowest(&values, 2), vec![None, Some(1.0), Some(1.0), Some(1.0), Some(1.0)]);
    }

    #[test]
    fn test_population_stddev() {
        let sd = stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_skips_windows_with_gaps() {
        let values = vec![Some(1.0), None, Some(3.0), Some(4.0)];
        let out = rolling(&values, 2, mean);
        assert_eq!(out, vec![None, None, None, Some(3.5)]);
    }

    #[test]
    fn test_rolling_forward_trailing_undefined() {
        let out = rolling_forward(&defined(&[1.0, 2.0, 3.0]), 2, mean);
        assert_eq!(out, vec![Some(1.5), Some(2.5), None]);
    }

    #[test]
    fn test_lead() {
        assert_eq!(lead(&[1.0, 2.0, 3.0]), vec![Some(2.0), Some(3.0), None]);
    }
}
