use tracing::{debug, warn};

use crate::analytics::metrics::{mat_vec_multiply, portfolio_variance, vec_dot};
use crate::error::OptimizationError;
use crate::policy::RefinementObjective;
use crate::types::{equal_weights, AssetUniverse, RiskPreference, WeightConstraints, Weights};

const PIVOT_THRESHOLD: f64 = 1e-10;
const MIN_RISK: f64 = 1e-12;
const FEASIBILITY_SLACK: f64 = 1e-9;
const ARMIJO_C: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 50;
const BISECTION_STEPS: usize = 200;
const OBJECTIVE_TOLERANCE: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Mode 1: unconstrained analytic
// ---------------------------------------------------------------------------

/// Closed-form mean-variance weights `Sigma^-1 mu / risk_aversion`, normalized
/// and clipped to long-only.
pub fn analytic_weights(
    universe: &AssetUniverse,
    risk: RiskPreference,
) -> Result<Weights, OptimizationError> {
    let n = universe.len();
    let inv = mat_inverse(&universe.covariance)?;
    let aversion = risk.risk_aversion();
    let raw: Vec<f64> = mat_vec_multiply(&inv, &universe.returns)
        .into_iter()
        .map(|v| v / aversion)
        .collect();
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(OptimizationError::NumericalFailure(
            "Analytic weights are not finite".into(),
        ));
    }

    let total: f64 = raw.iter().sum();
    let normalized = if total > 0.0 {
        raw.iter().map(|v| v / total).collect()
    } else {
        equal_weights(n)
    };

    let mut clipped: Vec<f64> = normalized.into_iter().map(|v| v.max(0.0)).collect();
    normalize_weights(&mut clipped);
    Ok(clipped)
}

/// [`analytic_weights`] with the uniform fallback applied.
pub fn analytic_or_uniform(universe: &AssetUniverse, risk: RiskPreference) -> Weights {
    match analytic_weights(universe, risk) {
        Ok(w) => w,
        Err(err) => {
            warn!(error = %err, "Analytic refinement failed; using equal weights");
            equal_weights(universe.len())
        }
    }
}

// ---------------------------------------------------------------------------
// Mode 2: bounded continuous
// ---------------------------------------------------------------------------

/// Settings for the bounded projected-gradient solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedSettings {
    pub objective: RefinementObjective,
    pub risk_free_rate: f64,
    pub max_iterations: u32,
    /// Converged when no weight moves by more than this in one step.
    pub tolerance: f64,
}

/// Converged bounded solution.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedSolution {
    pub weights: Weights,
    pub iterations: u32,
    pub objective_value: f64,
}

/// Bound midpoints projected onto the feasible set. Infeasible bounds get
/// the renormalized midpoints, uniform when every bound is zero.
pub fn midpoint_seed(bounds: &WeightConstraints) -> Weights {
    let mut mid: Vec<f64> = bounds
        .min_weights
        .iter()
        .zip(bounds.max_weights.iter())
        .map(|(lo, hi)| (lo + hi) / 2.0)
        .collect();
    if let Ok(projected) = project_bounded_simplex(&mid, &bounds.min_weights, &bounds.max_weights) {
        return projected;
    }
    normalize_weights(&mut mid);
    mid
}

/// Optimize the objective over `{sum w = 1, min <= w <= max}` by projected
/// gradient descent with Armijo backtracking, starting from `seed`.
pub fn solve_bounded(
    universe: &AssetUniverse,
    risk: RiskPreference,
    bounds: &WeightConstraints,
    seed: &[f64],
    settings: &BoundedSettings,
) -> Result<BoundedSolution, OptimizationError> {
    let lo = &bounds.min_weights;
    let hi = &bounds.max_weights;
    let objective = Objective {
        universe,
        risk,
        kind: settings.objective,
        rf: settings.risk_free_rate,
    };

    let mut w = project_bounded_simplex(seed, lo, hi)?;
    let mut f = objective.value(&w)?;

    for iter in 1..=settings.max_iterations {
        let grad = objective.gradient(&w)?;

        let mut step = 1.0;
        let mut accepted: Option<(Weights, f64)> = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = w.iter().zip(grad.iter()).map(|(wi, g)| wi - step * g).collect();
            let cand = project_bounded_simplex(&trial, lo, hi)?;
            let decrease: f64 = grad
                .iter()
                .zip(cand.iter().zip(w.iter()))
                .map(|(g, (c, wi))| g * (c - wi))
                .sum();
            let f_cand = objective.value(&cand)?;
            if f_cand <= f + ARMIJO_C * decrease {
                accepted = Some((cand, f_cand));
                break;
            }
            step *= 0.5;
        }

        // No sufficient decrease at any step length: stationary point
        let Some((cand, f_cand)) = accepted else {
            debug!(iter, "Bounded solver stationary");
            return Ok(finish(w, lo, hi, iter, f));
        };

        let dw = cand
            .iter()
            .zip(w.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        let df = (f_cand - f).abs();
        w = cand;
        f = f_cand;

        if dw < settings.tolerance || df < OBJECTIVE_TOLERANCE {
            debug!(iter, objective = f, "Bounded solver converged");
            return Ok(finish(w, lo, hi, iter, f));
        }
    }

    Err(OptimizationError::SolverNonconvergence {
        solver: "projected_gradient".into(),
        iterations: settings.max_iterations,
    })
}

fn finish(mut w: Weights, lo: &[f64], hi: &[f64], iterations: u32, objective_value: f64) -> BoundedSolution {
    for i in 0..w.len() {
        w[i] = w[i].clamp(lo[i], hi[i]);
    }
    normalize_weights(&mut w);
    BoundedSolution {
        weights: w,
        iterations,
        objective_value,
    }
}

/// Minimized objective and its gradient.
struct Objective<'a> {
    universe: &'a AssetUniverse,
    risk: RiskPreference,
    kind: RefinementObjective,
    rf: f64,
}

impl Objective<'_> {
    fn moments(&self, w: &[f64]) -> Result<(f64, f64), OptimizationError> {
        let ret = vec_dot(w, &self.universe.returns);
        let sigma = portfolio_variance(w, &self.universe.covariance).max(0.0).sqrt();
        if !(sigma.is_finite() && sigma >= MIN_RISK) {
            return Err(OptimizationError::NumericalFailure(format!(
                "Portfolio volatility {} too small to optimize",
                sigma
            )));
        }
        Ok((ret, sigma))
    }

    fn value(&self, w: &[f64]) -> Result<f64, OptimizationError> {
        let (ret, sigma) = self.moments(w)?;
        Ok(match self.kind {
            RefinementObjective::MaxSharpe => -(ret - self.rf) / sigma,
            RefinementObjective::RiskReturnTradeoff => {
                let r = self.risk.value();
                r * sigma - (1.0 - r) * ret
            }
        })
    }

    fn gradient(&self, w: &[f64]) -> Result<Vec<f64>, OptimizationError> {
        let (ret, sigma) = self.moments(w)?;
        let sigma_w = mat_vec_multiply(&self.universe.covariance, w);
        let mu = &self.universe.returns;
        Ok(match self.kind {
            RefinementObjective::MaxSharpe => {
                let excess = ret - self.rf;
                let sigma3 = sigma * sigma * sigma;
                // -dS/dw = -(mu / sigma - excess * Sigma w / sigma^3)
                (0..w.len())
                    .map(|i| -mu[i] / sigma + excess * sigma_w[i] / sigma3)
                    .collect()
            }
            RefinementObjective::RiskReturnTradeoff => {
                let r = self.risk.value();
                (0..w.len())
                    .map(|i| r * sigma_w[i] / sigma - (1.0 - r) * mu[i])
                    .collect()
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Constraint helpers
// ---------------------------------------------------------------------------

/// Euclidean projection onto `{sum w = 1, lo <= w <= hi}`.
///
/// The projection is `clamp(v - tau, lo, hi)` for the unique shift `tau`
/// making the components sum to one, found by bisection.
pub fn project_bounded_simplex(
    v: &[f64],
    lo: &[f64],
    hi: &[f64],
) -> Result<Weights, OptimizationError> {
    let sum_lo: f64 = lo.iter().sum();
    let sum_hi: f64 = hi.iter().sum();
    if sum_lo > 1.0 + FEASIBILITY_SLACK || sum_hi < 1.0 - FEASIBILITY_SLACK {
        return Err(OptimizationError::Infeasible(format!(
            "Weight bounds admit no fully invested portfolio (sum of minimums {:.4}, sum of maximums {:.4})",
            sum_lo, sum_hi
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(OptimizationError::NumericalFailure(
            "Cannot project non-finite weights".into(),
        ));
    }

    let shifted = |tau: f64| -> f64 {
        v.iter()
            .zip(lo.iter().zip(hi.iter()))
            .map(|(x, (l, h))| (x - tau).clamp(*l, *h))
            .sum()
    };

    // shifted(tau_lo) = sum_hi >= 1, shifted(tau_hi) = sum_lo <= 1
    let mut tau_lo = v
        .iter()
        .zip(hi.iter())
        .map(|(x, h)| x - h)
        .fold(f64::INFINITY, f64::min);
    let mut tau_hi = v
        .iter()
        .zip(lo.iter())
        .map(|(x, l)| x - l)
        .fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (tau_lo + tau_hi);
        if shifted(mid) > 1.0 {
            tau_lo = mid;
        } else {
            tau_hi = mid;
        }
        if tau_hi - tau_lo < 1e-15 {
            break;
        }
    }

    let tau = 0.5 * (tau_lo + tau_hi);
    Ok(v
        .iter()
        .zip(lo.iter().zip(hi.iter()))
        .map(|(x, (l, h))| (x - tau).clamp(*l, *h))
        .collect())
}

/// Scale to sum one; uniform when the sum is not positive.
pub fn normalize_weights(w: &mut [f64]) {
    let sum: f64 = w.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        for wi in w.iter_mut() {
            *wi /= sum;
        }
    } else if !w.is_empty() {
        let eq = 1.0 / w.len() as f64;
        for wi in w.iter_mut() {
            *wi = eq;
        }
    }
}

// ---------------------------------------------------------------------------
// Matrix helpers
// ---------------------------------------------------------------------------

/// Gauss-Jordan inverse with partial pivoting.
#[allow(clippy::needless_range_loop)]
pub fn mat_inverse(mat: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, OptimizationError> {
    let n = mat.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut aug: Vec<Vec<f64>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(&mat[i]);
        for j in 0..n {
            row.push(if i == j { 1.0 } else { 0.0 });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < PIVOT_THRESHOLD {
            return Err(OptimizationError::SingularMatrix);
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::metrics::{compute_sharpe, PortfolioMetrics};

    fn two_asset() -> AssetUniverse {
        AssetUniverse::new(
            vec!["A".into(), "B".into()],
            vec![0.10, 0.20],
            vec![vec![0.04, 0.0], vec![0.0, 0.09]],
        )
        .unwrap()
    }

    fn three_asset() -> AssetUniverse {
        AssetUniverse::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![0.08, 0.12, 0.15],
            vec![
                vec![0.04, 0.006, 0.002],
                vec![0.006, 0.09, 0.009],
                vec![0.002, 0.009, 0.16],
            ],
        )
        .unwrap()
    }

    fn settings(max_iterations: u32) -> BoundedSettings {
        BoundedSettings {
            objective: RefinementObjective::MaxSharpe,
            risk_free_rate: 0.02,
            max_iterations,
            tolerance: 1e-9,
        }
    }

    fn assert_simplex(w: &[f64]) {
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "sum = {}", sum);
        assert!(w.iter().all(|x| (0.0..=1.0).contains(x)), "{:?}", w);
    }

    // 1. Analytic

    #[test]
    fn test_analytic_two_asset_favors_first() {
        // Sigma^-1 mu = [2.5, 2.222...] -> asset 0 gets the larger share
        let w = analytic_weights(&two_asset(), RiskPreference(0.5)).unwrap();
        assert_simplex(&w);
        assert!(w[0] > w[1]);
        assert!((w[0] - 2.5 / (2.5 + 0.2 / 0.09)).abs() < 1e-12);
    }

    #[test]
    fn test_analytic_singular_is_error() {
        let u = AssetUniverse::new(
            vec!["A".into(), "B".into()],
            vec![0.1, 0.1],
            vec![vec![0.04, 0.04], vec![0.04, 0.04]],
        )
        .unwrap();
        assert_eq!(
            analytic_weights(&u, RiskPreference(0.5)),
            Err(OptimizationError::SingularMatrix)
        );
        assert_eq!(analytic_or_uniform(&u, RiskPreference(0.5)), vec![0.5, 0.5]);
    }

    #[test]
    fn test_analytic_negative_returns_uniform() {
        let u = AssetUniverse::new(
            vec!["A".into(), "B".into()],
            vec![-0.1, -0.2],
            vec![vec![0.04, 0.0], vec![0.0, 0.09]],
        )
        .unwrap();
        assert_eq!(analytic_weights(&u, RiskPreference(0.5)).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_analytic_clips_shorts() {
        let u = AssetUniverse::new(
            vec!["A".into(), "B".into()],
            vec![0.20, -0.05],
            vec![vec![0.04, 0.0], vec![0.0, 0.04]],
        )
        .unwrap();
        let w = analytic_weights(&u, RiskPreference(0.5)).unwrap();
        assert_eq!(w, vec![1.0, 0.0]);
    }

    // 2. Projection

    #[test]
    fn test_projection_lands_in_feasible_set() {
        let lo = vec![0.0, 0.1, 0.0];
        let hi = vec![0.5, 0.6, 0.8];
        let w = project_bounded_simplex(&[2.0, -1.0, 0.3], &lo, &hi).unwrap();
        assert_simplex(&w);
        for i in 0..3 {
            assert!(w[i] >= lo[i] - 1e-12 && w[i] <= hi[i] + 1e-12);
        }
    }

    #[test]
    fn test_projection_fixed_point() {
        let w = project_bounded_simplex(&[0.2, 0.3, 0.5], &[0.0; 3], &[1.0; 3]).unwrap();
        for (a, b) in w.iter().zip([0.2, 0.3, 0.5].iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_projection_infeasible_bounds() {
        let err = project_bounded_simplex(&[0.5, 0.5], &[0.0, 0.0], &[0.3, 0.3]).unwrap_err();
        assert!(matches!(err, OptimizationError::Infeasible(_)));
    }

    // 3. Bounded solver

    #[test]
    fn test_bounded_improves_on_seed() {
        let u = three_asset();
        let bounds = WeightConstraints::uniform(3, 0.0, 0.6);
        let seed = midpoint_seed(&bounds);
        let sol = solve_bounded(&u, RiskPreference(0.5), &bounds, &seed, &settings(1000)).unwrap();
        assert_simplex(&sol.weights);
        assert!(sol.weights.iter().all(|w| *w <= 0.6 + 1e-9));
        let before = PortfolioMetrics::evaluate(&seed, &u, 0.02).sharpe;
        let after = PortfolioMetrics::evaluate(&sol.weights, &u, 0.02).sharpe;
        assert!(after >= before - 1e-9, "{} < {}", after, before);
    }

    #[test]
    fn test_bounded_tight_cap_binds() {
        // Unconstrained tangency puts ~0.84 on asset 0
        let u = AssetUniverse::new(
            vec!["A".into(), "B".into()],
            vec![0.20, 0.10],
            vec![vec![0.04, 0.0], vec![0.0, 0.09]],
        )
        .unwrap();
        let bounds = WeightConstraints::uniform(2, 0.0, 0.55);
        let sol = solve_bounded(&u, RiskPreference(0.5), &bounds, &[0.5, 0.5], &settings(1000)).unwrap();
        assert!((sol.weights[0] - 0.55).abs() < 1e-6, "{:?}", sol.weights);
    }

    #[test]
    fn test_bounded_nonconvergence_reported() {
        let u = three_asset();
        let bounds = WeightConstraints::uniform(3, 0.0, 1.0);
        let err = solve_bounded(&u, RiskPreference(0.5), &bounds, &[1.0, 0.0, 0.0], &settings(1))
            .unwrap_err();
        assert_eq!(
            err,
            OptimizationError::SolverNonconvergence {
                solver: "projected_gradient".into(),
                iterations: 1
            }
        );
    }

    #[test]
    fn test_bounded_zero_risk_is_numerical_failure() {
        let u = AssetUniverse::new(
            vec!["A".into(), "B".into()],
            vec![0.05, 0.06],
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
        )
        .unwrap();
        let bounds = WeightConstraints::uniform(2, 0.0, 1.0);
        let err = solve_bounded(&u, RiskPreference(0.5), &bounds, &[0.5, 0.5], &settings(100))
            .unwrap_err();
        assert!(matches!(err, OptimizationError::NumericalFailure(_)));
    }

    #[test]
    fn test_risk_return_tradeoff_objective() {
        let u = two_asset();
        let bounds = WeightConstraints::uniform(2, 0.0, 1.0);
        let s = BoundedSettings {
            objective: RefinementObjective::RiskReturnTradeoff,
            ..settings(1000)
        };
        // r = 0: pure return maximization
        let sol = solve_bounded(&u, RiskPreference(0.0), &bounds, &[0.5, 0.5], &s).unwrap();
        assert!(sol.weights[1] > 0.999, "{:?}", sol.weights);
    }

    #[test]
    fn test_midpoint_seed_zero_bounds() {
        let b = WeightConstraints::uniform(4, 0.0, 0.0);
        assert_eq!(midpoint_seed(&b), vec![0.25; 4]);
    }

    #[test]
    fn test_midpoint_seed_within_bounds() {
        // renormalized midpoints would be [0.667, 0.167, 0.167]
        let b = WeightConstraints {
            min_weights: vec![0.0, 0.1, 0.1],
            max_weights: vec![0.4, 0.2, 0.2],
        };
        let seed = midpoint_seed(&b);
        assert!((seed.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        for (w, (lo, hi)) in seed.iter().zip(b.min_weights.iter().zip(b.max_weights.iter())) {
            assert!(*w >= lo - 1e-9 && *w <= hi + 1e-9, "{:?}", seed);
        }
    }

    // 4. Matrix helpers

    #[test]
    fn test_mat_inverse_identity_product() {
        let m = vec![vec![4.0, 1.0], vec![2.0, 3.0]];
        let inv = mat_inverse(&m).unwrap();
        // det = 10
        assert!((inv[0][0] - 0.3).abs() < 1e-12);
        assert!((inv[0][1] + 0.1).abs() < 1e-12);
        assert!((inv[1][0] + 0.2).abs() < 1e-12);
        assert!((inv[1][1] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_sharpe_helper_consistent() {
        let m = PortfolioMetrics::evaluate(&[0.5, 0.5], &two_asset(), 0.02);
        assert_eq!(m.sharpe, compute_sharpe(m.expected_return, 0.02, m.risk));
    }
}
