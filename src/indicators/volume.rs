use super::{rolling_sum, zip_with, Series};

/// Rolling sum of typical prices divided by rolling sum of volume.
///
/// Note the numerator is not weighted by volume, so this is a price-per-unit
/// ratio rather than a true VWAP. The dashboard models were fitted on exactly
/// this value. Windows with zero total volume are undefined.
pub fn vwap(typical_prices: &[f64], volumes: &[f64], period: usize) -> Series {
    let price_sum = rolling_sum(typical_prices, period);
    let volume_sum = rolling_sum(volumes, period);
    zip_with(&price_sum, &volume_sum, |p, v| p / v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vwap_ratio_of_sums() {
        let typical = [10.0, 20.0, 30.0];
        let volumes = [1.0, 2.0, 3.0];
        let out = vwap(&typical, &volumes, 2);
        assert_eq!(out[0], None);
        assert!((out[1].unwrap() - 30.0 / 3.0).abs() < 1e-12);
        assert!((out[2].unwrap() - 50.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_volume_undefined() {
        let out = vwap(&[10.0, 11.0, 12.0], &[0.0, 0.0, 0.0], 2);
        assert!(out.iter().all(Option::is_none));
    }
}
