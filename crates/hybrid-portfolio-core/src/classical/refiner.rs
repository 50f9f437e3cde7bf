use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use super::integer_lp::solve_integer_allocation;
use super::mean_variance::{analytic_or_uniform, midpoint_seed, solve_bounded, BoundedSettings};
use crate::analytics::metrics::PortfolioMetrics;
use crate::error::{OptimizationError, PortfolioError};
use crate::policy::OptimizerPolicy;
use crate::quantum::allocator::shares_to_weights;
use crate::types::{
    with_metadata, AssetUniverse, ComputationOutput, RiskPreference, ShareConstraints, Shares,
    WeightConstraints, Weights,
};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Optional constraints selecting the refinement mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinerConstraints {
    pub weight_bounds: Option<WeightConstraints>,
    /// Solve for whole shares instead of weights. Requires `share_constraints`.
    #[serde(default)]
    pub integer_optimization: bool,
    pub share_constraints: Option<ShareConstraints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementMode {
    Analytic,
    Bounded,
    Integer,
}

/// Weights produced by the classical refiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refinement {
    pub weights: Weights,
    /// Set by the integer mode only.
    pub shares: Option<Shares>,
    pub mode: RefinementMode,
    /// False when a bounded solve hit its iteration cap and returned its seed.
    pub converged: bool,
    /// Stage errors absorbed on the way to this result.
    pub fallbacks: Vec<String>,
}

impl Refinement {
    fn new(weights: Weights, mode: RefinementMode) -> Self {
        Refinement {
            weights,
            shares: None,
            mode,
            converged: true,
            fallbacks: Vec::new(),
        }
    }
}

/// Input to a standalone refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementInput {
    pub universe: AssetUniverse,
    pub risk_preference: RiskPreference,
    #[serde(default)]
    pub constraints: Option<RefinerConstraints>,
}

/// Refinement plus the metrics of its weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementOutput {
    pub refinement: Refinement,
    pub metrics: PortfolioMetrics,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Classical mean-variance refinement with the mode chosen by `constraints`:
/// integer when requested with share constraints, bounded when weight bounds
/// are given, analytic otherwise. A failing integer solve falls through to
/// the weight modes.
pub fn refine(
    universe: &AssetUniverse,
    risk: RiskPreference,
    constraints: Option<&RefinerConstraints>,
    policy: &OptimizerPolicy,
) -> Refinement {
    let mut fallbacks = Vec::new();
    let constraints = constraints.cloned().unwrap_or_default();

    if constraints.integer_optimization {
        match &constraints.share_constraints {
            Some(sc) => {
                match solve_integer_allocation(&universe.returns, sc, policy.milp_max_nodes) {
                    Ok(sol) => {
                        info!(shares = ?sol.shares, nodes = sol.nodes_explored, "Integer refinement solved");
                        let mut r = Refinement::new(
                            shares_to_weights(&sol.shares, &sc.prices),
                            RefinementMode::Integer,
                        );
                        r.shares = Some(sol.shares);
                        return r;
                    }
                    Err(err) => {
                        warn!(error = %err, "Integer refinement failed; using continuous weights");
                        fallbacks.push(err.to_string());
                    }
                }
            }
            None => {
                warn!("Integer refinement requested without share constraints");
                fallbacks.push("integer optimization requires share constraints".into());
            }
        }
    }

    let mut result = match &constraints.weight_bounds {
        Some(bounds) => {
            let seed = midpoint_seed(bounds);
            refine_bounded(universe, risk, bounds, &seed, policy.bounded_max_iterations, policy)
        }
        None => Refinement::new(analytic_or_uniform(universe, risk), RefinementMode::Analytic),
    };
    fallbacks.append(&mut result.fallbacks);
    result.fallbacks = fallbacks;
    result
}

/// Bounded mode from an explicit seed.
///
/// Non-convergence returns the seed itself; any other failure drops to the
/// analytic mode.
pub fn refine_bounded(
    universe: &AssetUniverse,
    risk: RiskPreference,
    bounds: &WeightConstraints,
    seed: &[f64],
    max_iterations: u32,
    policy: &OptimizerPolicy,
) -> Refinement {
    let settings = BoundedSettings {
        objective: policy.refinement_objective,
        risk_free_rate: policy.risk_free_rate,
        max_iterations,
        tolerance: policy.bounded_tolerance,
    };
    match solve_bounded(universe, risk, bounds, seed, &settings) {
        Ok(sol) => {
            info!(iterations = sol.iterations, "Bounded refinement converged");
            Refinement::new(sol.weights, RefinementMode::Bounded)
        }
        Err(err @ OptimizationError::SolverNonconvergence { .. }) => {
            warn!(error = %err, "Bounded refinement did not converge; keeping seed weights");
            let mut r = Refinement::new(seed.to_vec(), RefinementMode::Bounded);
            r.converged = false;
            r.fallbacks.push(err.to_string());
            r
        }
        Err(err) => {
            warn!(error = %err, "Bounded refinement failed; using analytic weights");
            let mut r =
                Refinement::new(analytic_or_uniform(universe, risk), RefinementMode::Analytic);
            r.fallbacks.push(err.to_string());
            r
        }
    }
}

/// Standalone refinement wrapped in the computation envelope.
pub fn run_refinement(
    input: &RefinementInput,
    policy: &OptimizerPolicy,
) -> PortfolioResult<ComputationOutput<RefinementOutput>> {
    let start = Instant::now();
    input.universe.validate()?;
    let n = input.universe.len();
    if let Some(c) = &input.constraints {
        if let Some(b) = &c.weight_bounds {
            b.validate(n)?;
        }
        if let Some(s) = &c.share_constraints {
            s.validate(n)?;
        }
    }
    let r = input.risk_preference.value();
    if !(0.0..=1.0).contains(&r) {
        return Err(PortfolioError::invalid(
            "risk_preference",
            "Risk preference must be in [0, 1]",
        ));
    }

    let refinement = refine(
        &input.universe,
        input.risk_preference,
        input.constraints.as_ref(),
        policy,
    );
    let metrics = PortfolioMetrics::evaluate(&refinement.weights, &input.universe, policy.risk_free_rate);

    let mut warnings: Vec<String> = refinement
        .fallbacks
        .iter()
        .map(|f| format!("Fallback applied: {}", f))
        .collect();
    if let Some(w) = refinement.weights.iter().cloned().reduce(f64::max) {
        if w > policy.concentration_trigger {
            warnings.push(format!("Concentrated position: max weight {:.4}", w));
        }
    }

    let methodology = match refinement.mode {
        RefinementMode::Analytic => "Analytic mean-variance (inverse covariance)",
        RefinementMode::Bounded => "Bounded max-Sharpe (projected gradient, Armijo)",
        RefinementMode::Integer => "Integer share allocation (branch-and-bound)",
    };
    let assumptions = serde_json::json!({
        "risk_free_rate": policy.risk_free_rate,
        "risk_aversion": input.risk_preference.risk_aversion(),
        "objective": policy.refinement_objective,
        "max_iterations": policy.bounded_max_iterations,
        "max_nodes": policy.milp_max_nodes,
    });

    Ok(with_metadata(
        methodology,
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        RefinementOutput {
            refinement,
            metrics,
        },
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
