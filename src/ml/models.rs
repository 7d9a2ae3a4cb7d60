//! Regression model roster and the fitted-model wrapper.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::elastic_net::{ElasticNet, ElasticNetParameters};
use smartcore::linear::lasso::{Lasso, LassoParameters};
use smartcore::linear::ridge_regression::{RidgeRegression, RidgeRegressionParameters};
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use crate::error::ModelError;

type Matrix = DenseMatrix<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Ridge,
    Lasso,
    ElasticNet,
    RandomForest,
    GradientBoosting,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Ridge,
        ModelKind::Lasso,
        ModelKind::ElasticNet,
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Ridge => "Ridge",
            ModelKind::Lasso => "Lasso",
            ModelKind::ElasticNet => "ElasticNet",
            ModelKind::RandomForest => "RandomForest",
            ModelKind::GradientBoosting => "GradientBoosting",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("Unknown model: {}", s))
    }
}

/// One point of a model's hyperparameter grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hyperparams {
    Ridge { alpha: f64 },
    Lasso { alpha: f64 },
    ElasticNet { alpha: f64, l1_ratio: f64 },
    RandomForest { n_trees: usize, max_depth: u16, seed: u64 },
    GradientBoosting { n_estimators: usize, learning_rate: f64, max_depth: u16 },
}

impl Hyperparams {
    pub fn kind(&self) -> ModelKind {
        match self {
            Hyperparams::Ridge { .. } => ModelKind::Ridge,
            Hyperparams::Lasso { .. } => ModelKind::Lasso,
            Hyperparams::ElasticNet { .. } => ModelKind::ElasticNet,
            Hyperparams::RandomForest { .. } => ModelKind::RandomForest,
            Hyperparams::GradientBoosting { .. } => ModelKind::GradientBoosting,
        }
    }
}

impl fmt::Display for Hyperparams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparams::Ridge { alpha } | Hyperparams::Lasso { alpha } => {
                write!(f, "alpha={}", alpha)
            }
            Hyperparams::ElasticNet { alpha, l1_ratio } => {
                write!(f, "alpha={}, l1_ratio={}", alpha, l1_ratio)
            }
            Hyperparams::RandomForest { n_trees, max_depth, seed } => {
                write!(f, "n_trees={}, max_depth={}, seed={}", n_trees, max_depth, seed)
            }
            Hyperparams::GradientBoosting { n_estimators, learning_rate, max_depth } => write!(
                f,
                "n_estimators={}, learning_rate={}, max_depth={}",
                n_estimators, learning_rate, max_depth
            ),
        }
    }
}

/// An algorithm of the roster together with the grid searched for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCandidate {
    pub kind: ModelKind,
    pub grid: Vec<Hyperparams>,
}

/// The fixed roster, in tie-break order.
pub fn model_candidates(seed: u64) -> Vec<ModelCandidate> {
    let ridge = [0.1, 1.0, 10.0]
        .into_iter()
        .map(|alpha| Hyperparams::Ridge { alpha })
        .collect();

    let lasso = [0.001, 0.01, 0.1, 1.0]
        .into_iter()
        .map(|alpha| Hyperparams::Lasso { alpha })
        .collect();

    let mut elastic_net = Vec::new();
    for alpha in [0.01, 0.1, 1.0] {
        for l1_ratio in [0.2, 0.5, 0.8] {
            elastic_net.push(Hyperparams::ElasticNet { alpha, l1_ratio });
        }
    }

    let mut forest = Vec::new();
    for n_trees in [50, 100] {
        for max_depth in [5, 10] {
            forest.push(Hyperparams::RandomForest { n_trees, max_depth, seed });
        }
    }

    let mut boosting = Vec::new();
    for n_estimators in [50, 100] {
        for learning_rate in [0.05, 0.1] {
            boosting.push(Hyperparams::GradientBoosting {
                n_estimators,
                learning_rate,
                max_depth: 3,
            });
        }
    }

    vec![
        ModelCandidate { kind: ModelKind::Ridge, grid: ridge },
        ModelCandidate { kind: ModelKind::Lasso, grid: lasso },
        ModelCandidate { kind: ModelKind::ElasticNet, grid: elastic_net },
        ModelCandidate { kind: ModelKind::RandomForest, grid: forest },
        ModelCandidate { kind: ModelKind::GradientBoosting, grid: boosting },
    ]
}

/// A fitted model of any roster algorithm.
#[derive(Serialize, Deserialize)]
pub enum Regressor {
    Linear(LinearModel),
    RandomForest(RandomForestRegressor<f64, f64, Matrix, Vec<f64>>),
    GradientBoosting(GradientBoostedTrees),
}

impl fmt::Debug for Regressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regressor::Linear(m) => write!(f, "Regressor::Linear({:?})", m.kind()),
            Regressor::RandomForest(_) => write!(f, "Regressor::RandomForest"),
            Regressor::GradientBoosting(m) => {
                write!(f, "Regressor::GradientBoosting({} stages)", m.trees.len())
            }
        }
    }
}

impl Regressor {
    pub fn fit(params: &Hyperparams, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self, ModelError> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(fit_error(
                params.kind(),
                format!("{} rows against {} labels", x.nrows(), y.len()),
            ));
        }

        let model = match *params {
            Hyperparams::Ridge { .. } | Hyperparams::Lasso { .. } | Hyperparams::ElasticNet { .. } => {
                Regressor::Linear(LinearModel::fit(params, x, y)?)
            }
            Hyperparams::RandomForest { n_trees, max_depth, seed } => {
                let params = RandomForestRegressorParameters::default()
                    .with_n_trees(n_trees as _)
                    .with_max_depth(max_depth as _)
                    .with_min_samples_split(2)
                    .with_seed(seed);
                let forest = RandomForestRegressor::fit(&to_dense(x), &y.to_vec(), params)
                    .map_err(|e| fit_error(ModelKind::RandomForest, e))?;
                Regressor::RandomForest(forest)
            }
            Hyperparams::GradientBoosting { n_estimators, learning_rate, max_depth } => {
                Regressor::GradientBoosting(GradientBoostedTrees::fit(
                    x,
                    y,
                    n_estimators,
                    learning_rate,
                    max_depth,
                )?)
            }
        };
        Ok(model)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        let predictions = match self {
            Regressor::Linear(model) => model.predict(x)?,
            Regressor::RandomForest(forest) => forest
                .predict(&to_dense(x))
                .map_err(|e| ModelError::Predict(e.to_string()))?,
            Regressor::GradientBoosting(model) => model.predict(x)?,
        };
        if predictions.len() != x.nrows() || predictions.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::Predict(
                "model produced a non-finite prediction".to_string(),
            ));
        }
        Ok(predictions)
    }
}

#[derive(Serialize, Deserialize)]
enum LinearInner {
    Ridge(RidgeRegression<f64, f64, Matrix, Vec<f64>>),
    Lasso(Lasso<f64, f64, Matrix, Vec<f64>>),
    ElasticNet(ElasticNet<f64, f64, Matrix, Vec<f64>>),
}

/// Penalized linear model fitted on centered inputs.
///
/// The solvers run without their own normalization, which also drops their
/// intercept, so the column means and the label mean are stored here and
/// added back at prediction time.
#[derive(Serialize, Deserialize)]
pub struct LinearModel {
    x_offset: Vec<f64>,
    y_offset: f64,
    inner: LinearInner,
}

impl LinearModel {
    fn fit(params: &Hyperparams, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self, ModelError> {
        let kind = params.kind();
        let x_offset = x
            .mean_axis(Axis(0))
            .ok_or_else(|| fit_error(kind, "no rows"))?;
        let y_offset = y.mean().ok_or_else(|| fit_error(kind, "no labels"))?;

        let xc = to_dense(&(x - &x_offset));
        let yc: Vec<f64> = y.iter().map(|v| v - y_offset).collect();

        let inner = match *params {
            Hyperparams::Ridge { alpha } => {
                let p = RidgeRegressionParameters::default()
                    .with_alpha(alpha)
                    .with_normalize(false);
                LinearInner::Ridge(RidgeRegression::fit(&xc, &yc, p).map_err(|e| fit_error(kind, e))?)
            }
            Hyperparams::Lasso { alpha } => {
                let p = LassoParameters::default().with_alpha(alpha).with_normalize(false);
                LinearInner::Lasso(Lasso::fit(&xc, &yc, p).map_err(|e| fit_error(kind, e))?)
            }
            Hyperparams::ElasticNet { alpha, l1_ratio } => {
                let p = ElasticNetParameters::default()
                    .with_alpha(alpha)
                    .with_l1_ratio(l1_ratio)
                    .with_normalize(false);
                LinearInner::ElasticNet(ElasticNet::fit(&xc, &yc, p).map_err(|e| fit_error(kind, e))?)
            }
            _ => return Err(fit_error(kind, "not a linear model")),
        };

        Ok(Self {
            x_offset: x_offset.to_vec(),
            y_offset,
            inner,
        })
    }

    fn kind(&self) -> ModelKind {
        match self.inner {
            LinearInner::Ridge(_) => ModelKind::Ridge,
            LinearInner::Lasso(_) => ModelKind::Lasso,
            LinearInner::ElasticNet(_) => ModelKind::ElasticNet,
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        if x.ncols() != self.x_offset.len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.x_offset.len(),
                got: x.ncols(),
            });
        }
        let offset = Array1::from(self.x_offset.clone());
        let xc = to_dense(&(x - &offset));
        let centered = match &self.inner {
            LinearInner::Ridge(m) => m.predict(&xc),
            LinearInner::Lasso(m) => m.predict(&xc),
            LinearInner::ElasticNet(m) => m.predict(&xc),
        }
        .map_err(|e| ModelError::Predict(e.to_string()))?;
        Ok(centered.into_iter().map(|v| v + self.y_offset).collect())
    }
}

/// Least-squares gradient boosting over shallow regression trees.
///
/// Starts from the label mean and fits each tree to the current residuals.
/// No row subsampling, so a fit is fully determined by its inputs.
#[derive(Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    init: f64,
    learning_rate: f64,
    trees: Vec<DecisionTreeRegressor<f64, f64, Matrix, Vec<f64>>>,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_estimators: usize,
        learning_rate: f64,
        max_depth: u16,
    ) -> Result<Self, ModelError> {
        let kind = ModelKind::GradientBoosting;
        let init = y.mean().ok_or_else(|| fit_error(kind, "no labels"))?;
        let dense = to_dense(x);

        let mut current = vec![init; y.len()];
        let mut trees = Vec::with_capacity(n_estimators);
        for _ in 0..n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let params = DecisionTreeRegressorParameters::default()
                .with_max_depth(max_depth as _)
                .with_min_samples_split(2);
            let tree = DecisionTreeRegressor::fit(&dense, &residuals, params)
                .map_err(|e| fit_error(kind, e))?;
            let update = tree.predict(&dense).map_err(|e| fit_error(kind, e))?;
            for (p, u) in current.iter_mut().zip(update) {
                *p += learning_rate * u;
            }
            trees.push(tree);
        }

        Ok(Self { init, learning_rate, trees })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>, ModelError> {
        let dense = to_dense(x);
        let mut out = vec![self.init; x.nrows()];
        for tree in &self.trees {
            let update = tree
                .predict(&dense)
                .map_err(|e| ModelError::Predict(e.to_string()))?;
            for (p, u) in out.iter_mut().zip(update) {
                *p += self.learning_rate * u;
            }
        }
        Ok(out)
    }
}

/// Row-major copy into the matrix type the solvers expect.
fn to_dense(x: &Array2<f64>) -> Matrix {
    DenseMatrix::new(x.nrows(), x.ncols(), x.iter().copied().collect(), false)
}

fn fit_error(kind: ModelKind, message: impl ToString) -> ModelError {
    ModelError::Fit {
        model: kind.to_string(),
        message: message.to_string(),
    }
}
