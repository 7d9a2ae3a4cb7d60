pub mod dataset;
pub mod scaler;
pub mod models;
pub mod metrics;
pub mod selector;
pub mod arbiter;
pub mod persistence;

pub use dataset::{process_input, Samples, TrainingSet};
pub use scaler::StandardScaler;
pub use models::{model_candidates, Hyperparams, ModelCandidate, ModelKind, Regressor};
pub use metrics::RegressionMetrics;
pub use selector::{select_challenger, LeaderboardEntry, SelectionOutcome};
pub use arbiter::{arbitrate, ArbitrationOutcome, Decision, ModelArtifact};
pub use persistence::{ChampionStore, SqliteChampionStore, VersionConflict, VersionedArtifact};
