use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Self, ModelError> {
        if actual.is_empty() || actual.len() != predicted.len() {
            return Err(ModelError::Predict(format!(
                "cannot score {} predictions against {} labels",
                predicted.len(),
                actual.len()
            )));
        }
        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;

        let (mut sq, mut abs, mut total) = (0.0, 0.0, 0.0);
        for (a, p) in actual.iter().zip(predicted) {
            let err = a - p;
            sq += err * err;
            abs += err.abs();
            total += (a - mean).powi(2);
        }

        let mse = sq / n;
        // Same convention as scikit-learn for a constant target.
        let r2 = if total == 0.0 {
            if sq == 0.0 { 1.0 } else { 0.0 }
        } else {
            1.0 - sq / total
        };

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae: abs / n,
            r2,
        })
    }
}

impl std::fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MSE {:.4} | RMSE {:.4} | MAE {:.4} | R² {:.4}",
            self.mse, self.rmse, self.mae, self.r2
        )
    }
}
