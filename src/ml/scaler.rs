use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Per-column standardization to zero mean and unit variance.
///
/// Uses the population standard deviation. Constant columns keep a scale of
/// 1 so they map to zero instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Result<Self, ModelError> {
        let means = x.mean_axis(Axis(0)).ok_or_else(|| ModelError::Fit {
            model: "StandardScaler".to_string(),
            message: "no rows to fit on".to_string(),
        })?;
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s });

        Ok(Self {
            means: means.to_vec(),
            scales: scales.to_vec(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        self.check_width(x.ncols())?;
        let means = Array1::from(self.means.clone());
        let scales = Array1::from(self.scales.clone());
        Ok((x - &means) / &scales)
    }

    pub fn transform_row(&self, row: &Array1<f64>) -> Result<Array1<f64>, ModelError> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    fn check_width(&self, got: usize) -> Result<(), ModelError> {
        if got != self.n_features() {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features(),
                got,
            });
        }
        Ok(())
    }
}
