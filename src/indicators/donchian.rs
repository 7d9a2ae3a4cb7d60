use super::{highest, lowest, zip_with, Series};

#[derive(Debug, Clone, PartialEq)]
pub struct DonchianSeries {
    pub upper: Series,
    pub lower: Series,
    pub middle: Series,
}

pub fn donchian_channel(closes: &[f64], period: usize) -> DonchianSeries {
    let upper = highest(closes, period);
    let lower = lowest(closes, period);
    let middle = zip_with(&upper, &lower, |u, l| (u + l) / 2.0);
    DonchianSeries { upper, lower, middle }
}
