//! Champion/challenger comparison on the hold-out rows.

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::metrics::RegressionMetrics;
use super::models::{Hyperparams, ModelKind, Regressor};
use super::scaler::StandardScaler;
use crate::error::ModelError;

/// Everything needed to reproduce a prediction: the fitted model, the
/// scaler it was trained behind and the exact feature order.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_name: ModelKind,
    pub params: Hyperparams,
    pub regressor: Regressor,
    pub scaler: StandardScaler,
    pub feature_names: Vec<String>,
    /// Hold-out metrics at training time.
    pub metrics: RegressionMetrics,
    pub cv_mse: f64,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        bincode::serialize(self).map_err(|e| ModelError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        bincode::deserialize(bytes).map_err(|e| ModelError::Serialization(e.to_string()))
    }

    pub fn ensure_features(&self, feature_names: &[String]) -> Result<(), ModelError> {
        if self.feature_names != feature_names {
            return Err(ModelError::FeatureMismatch {
                expected: self.feature_names.clone(),
                actual: feature_names.to_vec(),
            });
        }
        Ok(())
    }

    /// Predicts from unscaled feature rows.
    pub fn predict(&self, raw: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        self.regressor.predict(&self.scaler.transform(raw)?)
    }

    pub fn predict_one(&self, raw: &Array1<f64>) -> Result<f64, ModelError> {
        let row = self.scaler.transform_row(raw)?.insert_axis(ndarray::Axis(0));
        self.regressor
            .predict(&row)?
            .first()
            .copied()
            .ok_or_else(|| ModelError::Predict("empty prediction".to_string()))
    }

    pub fn evaluate(&self, raw: &Array2<f64>, y: &Array1<f64>) -> Result<RegressionMetrics, ModelError> {
        let predictions = self.predict(raw)?;
        RegressionMetrics::evaluate(&y.to_vec(), &predictions)
    }
}

/// How the incumbent fared on the current hold-out rows.
#[derive(Debug, Clone, PartialEq)]
pub enum ChampionEvaluation {
    Absent,
    Incompatible(String),
    Scored(RegressionMetrics),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// No champion yet.
    Bootstrap,
    /// Stored champion cannot be scored against the current features.
    ReplaceIncompatible,
    Promote { improvement_pct: f64 },
    KeepChampion { improvement_pct: f64 },
}

impl Decision {
    pub fn promotes_challenger(&self) -> bool {
        !matches!(self, Decision::KeepChampion { .. })
    }

    pub fn improvement_pct(&self) -> Option<f64> {
        match self {
            Decision::Promote { improvement_pct } | Decision::KeepChampion { improvement_pct } => {
                Some(*improvement_pct)
            }
            _ => None,
        }
    }
}

/// Relative RMSE reduction of the challenger, in percent.
pub fn improvement_pct(champion_rmse: f64, challenger_rmse: f64) -> f64 {
    if champion_rmse == 0.0 {
        return if challenger_rmse == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    (champion_rmse - challenger_rmse) / champion_rmse * 100.0
}

/// The challenger replaces the champion only with a strictly lower RMSE.
pub fn decide(challenger: &RegressionMetrics, champion: &ChampionEvaluation) -> Decision {
    match champion {
        ChampionEvaluation::Absent => Decision::Bootstrap,
        ChampionEvaluation::Incompatible(_) => Decision::ReplaceIncompatible,
        ChampionEvaluation::Scored(champion) => {
            let improvement_pct = improvement_pct(champion.rmse, challenger.rmse);
            if challenger.rmse < champion.rmse {
                Decision::Promote { improvement_pct }
            } else {
                Decision::KeepChampion { improvement_pct }
            }
        }
    }
}

#[derive(Debug)]
pub struct ArbitrationOutcome {
    pub winner: ModelArtifact,
    pub winner_name: ModelKind,
    /// Winner's metrics on the current hold-out rows.
    pub winner_metrics: RegressionMetrics,
    pub is_new_champion: bool,
    pub improvement_pct: Option<f64>,
    pub decision: Decision,
}

/// Scores the stored champion, if any, on the same hold-out rows the
/// challenger was scored on.
pub fn evaluate_champion(
    champion: Option<&ModelArtifact>,
    feature_names: &[String],
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> ChampionEvaluation {
    let Some(champion) = champion else {
        return ChampionEvaluation::Absent;
    };
    match champion
        .ensure_features(feature_names)
        .and_then(|_| champion.evaluate(x, y))
    {
        Ok(metrics) => ChampionEvaluation::Scored(metrics),
        Err(e) => ChampionEvaluation::Incompatible(e.to_string()),
    }
}

/// Picks the model to serve. `challenger.metrics` must already hold its
/// hold-out scores.
pub fn arbitrate(
    challenger: ModelArtifact,
    champion: Option<ModelArtifact>,
    x: &Array2<f64>,
    y: &Array1<f64>,
) -> ArbitrationOutcome {
    let evaluation = evaluate_champion(champion.as_ref(), &challenger.feature_names, x, y);
    let decision = decide(&challenger.metrics, &evaluation);

    match (&decision, &evaluation) {
        (Decision::Bootstrap, _) => {
            info!("No champion yet, promoting {}", challenger.model_name)
        }
        (Decision::ReplaceIncompatible, ChampionEvaluation::Incompatible(reason)) => {
            warn!("Stored champion is unusable ({}), promoting {}", reason, challenger.model_name)
        }
        (Decision::Promote { improvement_pct }, ChampionEvaluation::Scored(m)) => info!(
            "Challenger {} wins: RMSE {:.4} vs {:.4} ({:.2}% better)",
            challenger.model_name, challenger.metrics.rmse, m.rmse, improvement_pct
        ),
        (Decision::KeepChampion { .. }, ChampionEvaluation::Scored(m)) => info!(
            "Champion holds: RMSE {:.4} vs challenger {} at {:.4}",
            m.rmse, challenger.model_name, challenger.metrics.rmse
        ),
        _ => {}
    }

    match (decision, champion, evaluation) {
        (Decision::KeepChampion { improvement_pct }, Some(champion), ChampionEvaluation::Scored(metrics)) => {
            ArbitrationOutcome {
                winner_name: champion.model_name,
                winner_metrics: metrics,
                winner: champion,
                is_new_champion: false,
                improvement_pct: Some(improvement_pct),
                decision,
            }
        }
        (decision, _, _) => ArbitrationOutcome {
            winner_name: challenger.model_name,
            winner_metrics: challenger.metrics,
            winner: challenger,
            is_new_champion: true,
            improvement_pct: decision.improvement_pct(),
            decision,
        },
    }
}
