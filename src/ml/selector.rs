use std::ops::Range;

use ndarray::{Array1, Array2};
use tracing::{debug, info, warn};

use super::dataset::Samples;
use super::metrics::RegressionMetrics;
use super::models::{Hyperparams, ModelCandidate, ModelKind, Regressor};
use crate::error::ModelError;

/// Contiguous, unshuffled folds. The first `n % k` folds take one extra row.
pub fn kfold_ranges(n: usize, k: usize) -> Vec<Range<usize>> {
    if k == 0 {
        return Vec::new();
    }
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Mean validation MSE of `params` across the folds.
pub fn cross_val_mse(
    params: &Hyperparams,
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: usize,
) -> Result<f64, ModelError> {
    let n = y.len();
    if folds < 2 || n < folds {
        return Err(ModelError::Fit {
            model: params.kind().to_string(),
            message: format!("{} rows cannot be split into {} folds", n, folds),
        });
    }

    let all = Samples::from_rows(x, y, 0..n);
    let mut total = 0.0;
    for fold in kfold_ranges(n, folds) {
        let train = all.without_rows(fold.clone());
        let test = Samples::from_rows(x, y, fold);
        let model = Regressor::fit(params, &train.x, &train.y)?;
        let predictions = model.predict(&test.x)?;
        let y_test = test.y.to_vec();
        total += RegressionMetrics::evaluate(&y_test, &predictions)?.mse;
    }
    Ok(total / folds as f64)
}

/// Best grid point of one algorithm by cross-validated MSE.
#[derive(Debug)]
pub struct CandidateResult {
    pub kind: ModelKind,
    pub params: Hyperparams,
    pub cv_mse: f64,
    pub cv_rmse: f64,
    /// Refit on every row the search saw.
    pub model: Regressor,
}

impl CandidateResult {
    pub fn summary(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            kind: self.kind,
            params: self.params.clone(),
            cv_mse: self.cv_mse,
            cv_rmse: self.cv_rmse,
        }
    }
}

/// One row of the per-algorithm results table.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub kind: ModelKind,
    pub params: Hyperparams,
    pub cv_mse: f64,
    pub cv_rmse: f64,
}

/// Every algorithm that produced a usable fit, in roster order, and which
/// of them is the challenger.
#[derive(Debug)]
pub struct SelectionOutcome {
    results: Vec<CandidateResult>,
    challenger: usize,
}

impl SelectionOutcome {
    pub fn results(&self) -> &[CandidateResult] {
        &self.results
    }

    pub fn challenger(&self) -> &CandidateResult {
        &self.results[self.challenger]
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.results().iter().map(CandidateResult::summary).collect()
    }

    pub fn into_challenger(mut self) -> CandidateResult {
        self.results.swap_remove(self.challenger)
    }
}

/// Scores every grid point. Failing points score infinity; earlier points
/// win ties. Returns `None` when the whole grid failed.
pub fn grid_search(
    candidate: &ModelCandidate,
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: usize,
) -> Option<(Hyperparams, f64)> {
    let mut best: Option<(Hyperparams, f64)> = None;
    for params in &candidate.grid {
        let score = match cross_val_mse(params, x, y, folds) {
            Ok(mse) if mse.is_finite() => mse,
            Ok(_) => f64::INFINITY,
            Err(e) => {
                warn!("{} [{}] failed: {}", candidate.kind, params, e);
                f64::INFINITY
            }
        };
        debug!("{} [{}] CV MSE {:.6}", candidate.kind, params, score);

        let improves = match &best {
            Some((_, best_score)) => score < *best_score,
            None => score.is_finite(),
        };
        if improves {
            best = Some((params.clone(), score));
        }
    }
    best
}

/// Runs the grid search for every candidate, refits each algorithm's best
/// point on all of `x` and picks the lowest CV MSE as the challenger. Ties
/// go to roster order.
pub fn select_challenger(
    candidates: &[ModelCandidate],
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: usize,
) -> Result<SelectionOutcome, ModelError> {
    let mut results: Vec<CandidateResult> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let Some((params, cv_mse)) = grid_search(candidate, x, y, folds) else {
            warn!("{}: no grid point produced a usable fit, skipping", candidate.kind);
            continue;
        };
        let model = match Regressor::fit(&params, x, y) {
            Ok(model) => model,
            Err(e) => {
                warn!("{}: refit on the full slice failed, skipping: {}", candidate.kind, e);
                continue;
            }
        };
        info!(
            "{}: best [{}] CV MSE {:.6} RMSE {:.6}",
            candidate.kind,
            params,
            cv_mse,
            cv_mse.sqrt()
        );
        results.push(CandidateResult {
            kind: candidate.kind,
            params,
            cv_mse,
            cv_rmse: cv_mse.sqrt(),
            model,
        });
    }

    let mut challenger: Option<usize> = None;
    for (i, result) in results.iter().enumerate() {
        if challenger.map_or(true, |best| result.cv_mse < results[best].cv_mse) {
            challenger = Some(i);
        }
    }
    let challenger = challenger.ok_or(ModelError::NoCandidate)?;

    let outcome = SelectionOutcome { results, challenger };
    let best = outcome.challenger();
    info!(
        "Challenger: {} [{}] (CV RMSE {:.6})",
        best.kind, best.params, best.cv_rmse
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::model_candidates;

    fn noisy_linear(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(r, c)| match c {
            0 => r as f64 / n as f64,
            1 => ((r * 13) % 7) as f64 - 3.0,
            _ => ((r as f64) * 0.9).sin(),
        });
        let y = x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, r)| 5.0 + 4.0 * r[0] - 0.5 * r[1] + 0.05 * ((i * 31) % 5) as f64)
            .collect();
        (x, y)
    }

    #[test]
    fn test_kfold_ranges() {
        assert_eq!(kfold_ranges(10, 3), vec![0..4, 4..7, 7..10]);
        assert_eq!(kfold_ranges(9, 3), vec![0..3, 3..6, 6..9]);
        assert_eq!(kfold_ranges(2, 3), vec![0..1, 1..2, 2..2]);
        assert!(kfold_ranges(5, 0).is_empty());
    }

    #[test]
    fn test_cross_val_requires_enough_rows() {
        let (x, y) = noisy_linear(2);
        assert!(cross_val_mse(&Hyperparams::Ridge { alpha: 1.0 }, &x, &y, 3).is_err());
    }

    #[test]
    fn test_grid_ties_keep_first_point() {
        let (x, y) = noisy_linear(30);
        let candidate = ModelCandidate {
            kind: ModelKind::Ridge,
            grid: vec![Hyperparams::Ridge { alpha: 1.0 }, Hyperparams::Ridge { alpha: 1.0 }],
        };
        let (params, score) = grid_search(&candidate, &x, &y, 3).unwrap();
        assert_eq!(params, Hyperparams::Ridge { alpha: 1.0 });
        assert!(score.is_finite());
    }

    #[test]
    fn test_failed_grid_is_skipped() {
        let (x, y) = noisy_linear(30);
        // An empty grid has nothing to score.
        let empty = ModelCandidate { kind: ModelKind::Lasso, grid: Vec::new() };
        assert!(grid_search(&empty, &x, &y, 3).is_none());

        let ridge = ModelCandidate {
            kind: ModelKind::Ridge,
            grid: vec![Hyperparams::Ridge { alpha: 0.1 }],
        };
        let outcome = select_challenger(&[empty, ridge], &x, &y, 3).unwrap();
        assert_eq!(outcome.challenger().kind, ModelKind::Ridge);
        assert_eq!(outcome.leaderboard().len(), 1);
    }

    #[test]
    fn test_no_candidate() {
        let (x, y) = noisy_linear(2);
        let err = select_challenger(&model_candidates(42)[..1], &x, &y, 3).unwrap_err();
        assert_eq!(err, ModelError::NoCandidate);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let (x, y) = noisy_linear(45);
        let candidates = model_candidates(42);
        let a = select_challenger(&candidates, &x, &y, 3).unwrap();
        let b = select_challenger(&candidates, &x, &y, 3).unwrap();

        assert_eq!(a.leaderboard(), b.leaderboard());
        assert_eq!(a.challenger().kind, b.challenger().kind);
        assert_eq!(a.challenger().params, b.challenger().params);
        let best = a
            .leaderboard()
            .iter()
            .map(|entry| entry.cv_mse)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(a.challenger().cv_mse, best);
    }

    #[test]
    fn test_every_algorithm_is_refit_and_reported() {
        let (x, y) = noisy_linear(45);
        let outcome = select_challenger(&model_candidates(42), &x, &y, 3).unwrap();

        let kinds: Vec<ModelKind> = outcome.results().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, ModelKind::ALL.to_vec());
        for result in outcome.results() {
            assert_eq!(result.params.kind(), result.kind);
            assert!(result.cv_mse.is_finite());
            assert_eq!(result.cv_rmse, result.cv_mse.sqrt());
            assert_eq!(result.model.predict(&x).unwrap().len(), 45);
        }

        let challenger = outcome.challenger().summary();
        let taken = outcome.into_challenger();
        assert_eq!(taken.summary(), challenger);
    }

    #[test]
    fn test_algorithm_ties_keep_roster_order() {
        let (x, y) = noisy_linear(30);
        let ridge = |alpha| ModelCandidate {
            kind: ModelKind::Ridge,
            grid: vec![Hyperparams::Ridge { alpha }],
        };
        let outcome = select_challenger(&[ridge(1.0), ridge(1.0)], &x, &y, 3).unwrap();
        assert_eq!(outcome.results().len(), 2);
        assert!(std::ptr::eq(outcome.challenger(), &outcome.results()[0]));
    }
}
