use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("window must be at least {min}, got {window}")]
    InvalidWindow { window: usize, min: usize },
    #[error("candle {0} is out of order")]
    UnorderedCandles(usize),
    #[error("candle {0} repeats the previous open time")]
    DuplicateCandle(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("column {column} is undefined at row {row}")]
    UndefinedValue { column: String, row: usize },
    #[error("not enough rows: need {needed}, got {got}")]
    InsufficientRows { needed: usize, got: usize },
    #[error("invalid split: {0}")]
    InvalidSplit(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{model} fit failed: {message}")]
    Fit { model: String, message: String },
    #[error("expected {expected} feature columns, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("prediction failed: {0}")]
    Predict(String),
    #[error("no model produced a usable fit")]
    NoCandidate,
    #[error("feature mismatch: artifact expects {expected:?}, got {actual:?}")]
    FeatureMismatch { expected: Vec<String>, actual: Vec<String> },
    #[error("artifact serialization failed: {0}")]
    Serialization(String),
}

/// Pipeline step a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Features,
    Training,
    Arbitration,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Features => "features",
            Stage::Training => "training",
            Stage::Arbitration => "arbitration",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("{stage} stage failed")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Box<dyn StdError + Send + Sync + 'static>,
}

impl PipelineError {
    pub fn new(stage: Stage, source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self { stage, source: source.into() }
    }
}

/// Tags an error with the stage it surfaced in.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E> StageExt<T> for Result<T, E>
where
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
{
    fn stage(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}
