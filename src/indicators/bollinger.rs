use super::{rolling_stddev, sma, zip_with, Series};

/// Bollinger bands of the close price.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub basis: Series,
    pub upper: Series,
    pub lower: Series,
}

/// Basis is the rolling mean; bands sit `std_dev_multiplier` population
/// standard deviations away from it.
pub fn bollinger_bands(closes: &[f64], period: usize, std_dev_multiplier: f64) -> BollingerSeries {
    let basis = sma(closes, period);
    let std_dev = rolling_stddev(closes, period);

    let upper = zip_with(&basis, &std_dev, |b, s| b + std_dev_multiplier * s);
    let lower = zip_with(&basis, &std_dev, |b, s| b - std_dev_multiplier * s);

    BollingerSeries { basis, upper, lower }
}
