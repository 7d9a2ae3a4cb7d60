use std::ops::Range;

use ndarray::{s, Array1, Array2};

use crate::error::DatasetError;
use crate::features::FeatureFrame;

/// Design matrix, labels and the live row extracted from a feature frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub feature_names: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub open_times: Vec<i64>,
    /// Features of the most recent candle, whose label is not known yet.
    pub live_row: Array1<f64>,
    pub live_open_time: i64,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Splits rows by position: the first `floor((1 - fraction) * n)` rows
    /// are used for fitting, the rest for validation.
    pub fn split_holdout(&self, validation_fraction: f64) -> Result<(Samples, Samples), DatasetError> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(DatasetError::InvalidSplit(format!(
                "validation fraction {} is outside [0, 1)",
                validation_fraction
            )));
        }
        let n = self.len();
        let fit_len = ((n as f64) * (1.0 - validation_fraction) + 1e-9).floor() as usize;
        if fit_len == 0 || fit_len >= n {
            return Err(DatasetError::InvalidSplit(format!(
                "{} rows leave {} for fitting and {} for validation",
                n,
                fit_len,
                n.saturating_sub(fit_len)
            )));
        }
        Ok((
            Samples::from_rows(&self.x, &self.y, 0..fit_len),
            Samples::from_rows(&self.x, &self.y, fit_len..n),
        ))
    }
}

/// An owned block of rows with their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl Samples {
    pub fn from_rows(x: &Array2<f64>, y: &Array1<f64>, rows: Range<usize>) -> Self {
        Self {
            x: x.slice(s![rows.clone(), ..]).to_owned(),
            y: y.slice(s![rows]).to_owned(),
        }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Every row except those in `excluded`.
    pub fn without_rows(&self, excluded: Range<usize>) -> Self {
        let keep: Vec<usize> = (0..self.len()).filter(|i| !excluded.contains(i)).collect();
        Self {
            x: self.x.select(ndarray::Axis(0), &keep),
            y: self.y.select(ndarray::Axis(0), &keep),
        }
    }
}

/// Builds the training set from a processed frame.
///
/// Training rows are `[window - 1, n - 1)`: the warm-up rows are dropped and
/// the last row, which has no label yet, becomes the live row. Every
/// training value must be defined.
pub fn process_input(
    frame: &FeatureFrame,
    feature_names: &[String],
    target: &str,
    window: usize,
) -> Result<TrainingSet, DatasetError> {
    let n = frame.len();
    let needed = window + 1;
    if window == 0 || n < needed {
        return Err(DatasetError::InsufficientRows { needed, got: n });
    }

    let columns = feature_names
        .iter()
        .map(|name| {
            frame
                .column(name)
                .ok_or_else(|| DatasetError::UnknownColumn(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let labels = frame
        .column(target)
        .ok_or_else(|| DatasetError::UnknownColumn(target.to_string()))?;

    let rows = (window - 1)..(n - 1);
    let live = n - 1;

    let mut x = Array2::zeros((rows.len(), columns.len()));
    let mut y = Array1::zeros(rows.len());
    for (r, row) in rows.clone().enumerate() {
        for (c, column) in columns.iter().enumerate() {
            x[[r, c]] = column[row].ok_or_else(|| DatasetError::UndefinedValue {
                column: feature_names[c].clone(),
                row,
            })?;
        }
        y[r] = labels[row].ok_or_else(|| DatasetError::UndefinedValue {
            column: target.to_string(),
            row,
        })?;
    }

    let live_row = columns
        .iter()
        .zip(feature_names)
        .map(|(column, name)| {
            column[live].ok_or_else(|| DatasetError::UndefinedValue {
                column: name.clone(),
                row: live,
            })
        })
        .collect::<Result<Array1<f64>, _>>()?;

    Ok(TrainingSet {
        feature_names: feature_names.to_vec(),
        x,
        y,
        open_times: frame.open_times()[rows].to_vec(),
        live_row,
        live_open_time: frame.open_times()[live],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{columns, generate_features};
    use crate::types::candle::fixtures::*;

    #[test]
    fn test_eleven_rows_give_seven_training_rows() {
        let frame = generate_features(&wavy_candles(11, 30_000.0), 4).unwrap();
        let set = process_input(&frame, &columns::roster(), columns::TARGET, 4).unwrap();

        assert_eq!(set.len(), 7);
        assert_eq!(set.x.dim(), (7, 21));
        assert_eq!(set.live_row.len(), 21);
        assert_eq!(set.open_times[0], BASE_TS + 3 * HOUR_MS);
        assert_eq!(set.live_open_time, BASE_TS + 10 * HOUR_MS);
        // label of the first training row is the close of the next candle
        assert_eq!(set.y[0], frame.value(4, columns::CLOSE).unwrap());
    }

    #[test]
    fn test_unknown_column() {
        let frame = generate_features(&wavy_candles(11, 30_000.0), 4).unwrap();
        let err = process_input(&frame, &["Nope".to_string()], columns::TARGET, 4).unwrap_err();
        assert_eq!(err, DatasetError::UnknownColumn("Nope".into()));
    }

    #[test]
    fn test_undefined_training_value() {
        let frame = generate_features(&wavy_candles(11, 30_000.0), 4).unwrap();
        // The 3h forward trend is undefined on the last two rows.
        let names = [columns::future_trend(3)];
        let err = process_input(&frame, &names, columns::TARGET, 4).unwrap_err();
        assert!(matches!(err, DatasetError::UndefinedValue { row: 9, .. }));

        // RSI is only undefined on the live row.
        let err = process_input(&frame, &[columns::RSI.to_string()], columns::TARGET, 4).unwrap_err();
        assert!(matches!(err, DatasetError::UndefinedValue { row: 10, .. }));
    }

    #[test]
    fn test_too_few_rows() {
        let frame = generate_features(&wavy_candles(4, 30_000.0), 4).unwrap();
        let err = process_input(&frame, &columns::roster(), columns::TARGET, 4).unwrap_err();
        assert_eq!(err, DatasetError::InsufficientRows { needed: 5, got: 4 });
    }

    #[test]
    fn test_holdout_is_positional() {
        let frame = generate_features(&wavy_candles(14, 30_000.0), 4).unwrap();
        let set = process_input(&frame, &columns::roster(), columns::TARGET, 4).unwrap();
        assert_eq!(set.len(), 10);

        let (fit, validation) = set.split_holdout(0.2).unwrap();
        assert_eq!(fit.len(), 8);
        assert_eq!(validation.len(), 2);
        assert_eq!(validation.y[0], set.y[8]);
        assert_eq!(fit.x.row(7), set.x.row(7));
    }

    #[test]
    fn test_holdout_rejects_empty_side() {
        let frame = generate_features(&wavy_candles(5, 30_000.0), 4).unwrap();
        let set = process_input(&frame, &columns::roster(), columns::TARGET, 4).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.split_holdout(0.2).is_err());
        assert!(set.split_holdout(1.5).is_err());
    }

    #[test]
    fn test_without_rows() {
        let x = Array2::from_shape_fn((5, 2), |(r, c)| (r * 10 + c) as f64);
        let y = Array1::from_iter((0..5).map(|v| v as f64));
        let samples = Samples::from_rows(&x, &y, 0..5);
        let rest = samples.without_rows(1..3);
        assert_eq!(rest.y.to_vec(), vec![0.0, 3.0, 4.0]);
        assert_eq!(rest.x[[1, 1]], 31.0);
    }
}
