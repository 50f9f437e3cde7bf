use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use crate::error::OptimizationError;
use crate::policy::{OptimizerPolicy, SolverCapability};
use crate::types::{
    equal_weights, with_metadata, AssetUniverse, ComputationOutput, RiskPreference,
    ShareConstraints, Shares, Weights,
};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which route produced an integer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPath {
    Qaoa,
    UniformFallback,
}

/// Integer allocation plus a record of how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub shares: Shares,
    pub path: AllocationPath,
    /// Stage error that forced the fallback, if any.
    pub fallback_reason: Option<String>,
    /// True when upper share bounds were reduced to fit the bit ceiling.
    pub bounds_tightened: bool,
}

/// Input to a standalone integer allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub universe: AssetUniverse,
    /// Risk preference in [0, 1].
    pub risk_preference: RiskPreference,
    pub share_constraints: Option<ShareConstraints>,
}

/// Allocation together with the implied weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutput {
    pub outcome: AllocationOutcome,
    pub weights: Weights,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Solve the bounded integer share problem, falling back to a uniform
/// budget split whenever the heuristic solver cannot be used.
///
/// Never fails: every stage error is absorbed into the fallback and recorded
/// on the outcome.
pub fn allocate_shares(
    universe: &AssetUniverse,
    risk: RiskPreference,
    constraints: Option<&ShareConstraints>,
    capability: SolverCapability,
    policy: &OptimizerPolicy,
) -> AllocationOutcome {
    let n = universe.len();
    let Some(constraints) = constraints else {
        warn!("No share constraints supplied; allocating one share per asset");
        return AllocationOutcome {
            shares: vec![1; n],
            path: AllocationPath::UniformFallback,
            fallback_reason: None,
            bounds_tightened: false,
        };
    };

    let attempt = if capability.is_available() {
        solve_integer_problem(universe, risk, constraints, policy)
    } else {
        Err(OptimizationError::SolverUnavailable)
    };

    match attempt {
        Ok((shares, bounds_tightened)) => {
            info!(?shares, "Integer allocation solved by QAOA");
            AllocationOutcome {
                shares,
                path: AllocationPath::Qaoa,
                fallback_reason: None,
                bounds_tightened,
            }
        }
        Err(err) => {
            let shares = fallback_shares(constraints, n);
            warn!(error = %err, ?shares, "Integer allocator falling back to uniform shares");
            AllocationOutcome {
                shares,
                path: AllocationPath::UniformFallback,
                fallback_reason: Some(err.to_string()),
                bounds_tightened: false,
            }
        }
    }
}

/// Uniform share count `max(1, floor(budget / (n * mean_price)))`.
///
/// Deliberately not clamped to the per-asset share bounds.
pub fn fallback_shares(constraints: &ShareConstraints, n: usize) -> Shares {
    if n == 0 {
        return Vec::new();
    }
    let mean_price = constraints.mean_price();
    let mean_price = if mean_price > 0.0 { mean_price } else { 1.0 };
    let per_asset = (constraints.budget / (n as f64 * mean_price)).floor();
    let per_asset = if per_asset.is_finite() && per_asset >= 1.0 {
        per_asset.min(u32::MAX as f64) as u32
    } else {
        1
    };
    vec![per_asset; n]
}

/// Convert share counts to value weights; uniform when nothing is held.
pub fn shares_to_weights(shares: &[u32], prices: &[f64]) -> Weights {
    let values: Vec<f64> = shares
        .iter()
        .zip(prices.iter())
        .map(|(s, p)| *s as f64 * p)
        .collect();
    let total: f64 = values.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return equal_weights(shares.len());
    }
    values.iter().map(|v| v / total).collect()
}

/// Standalone allocation wrapped in the computation envelope.
pub fn run_allocation(
    input: &AllocationInput,
    capability: SolverCapability,
    policy: &OptimizerPolicy,
) -> PortfolioResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    input.universe.validate()?;
    let n = input.universe.len();
    if let Some(c) = &input.share_constraints {
        c.validate(n)?;
    }

    let outcome = allocate_shares(
        &input.universe,
        input.risk_preference,
        input.share_constraints.as_ref(),
        capability,
        policy,
    );
    let weights = match &input.share_constraints {
        Some(c) => shares_to_weights(&outcome.shares, &c.prices),
        None => equal_weights(n),
    };

    let mut warnings = Vec::new();
    if let Some(reason) = &outcome.fallback_reason {
        warnings.push(format!("Uniform share fallback used: {}", reason));
    }
    if outcome.bounds_tightened {
        warnings.push(format!(
            "Share bounds tightened to a {}-bit encoding",
            policy.max_bits_per_asset
        ));
    }

    let assumptions = serde_json::json!({
        "risk_preference": input.risk_preference,
        "variance_penalty": input.risk_preference.variance_penalty(),
        "max_total_bits": policy.max_total_bits,
        "qaoa_reps": policy.qaoa_reps,
        "qaoa_shots": policy.qaoa_shots,
        "budget_enforced": false,
    });

    Ok(with_metadata(
        "QAOA integer share allocation (QUBO, state-vector simulation)",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        AllocationOutput { outcome, weights },
    ))
}

// ---------------------------------------------------------------------------
// Solver path
// ---------------------------------------------------------------------------

#[cfg(feature = "qaoa")]
fn solve_integer_problem(
    universe: &AssetUniverse,
    risk: RiskPreference,
    constraints: &ShareConstraints,
    policy: &OptimizerPolicy,
) -> Result<(Shares, bool), OptimizationError> {
    use super::encoding::ShareEncoding;
    use super::qaoa::QaoaSolver;

    let encoding = ShareEncoding::build(constraints, policy)?;
    let qubo = encoding.to_qubo(universe, risk);
    let solution = QaoaSolver::from_policy(policy).solve(&qubo)?;
    Ok((encoding.decode(solution.state), encoding.tightened))
}

#[cfg(not(feature = "qaoa"))]
fn solve_integer_problem(
    _universe: &AssetUniverse,
    _risk: RiskPreference,
    _constraints: &ShareConstraints,
    _policy: &OptimizerPolicy,
) -> Result<(Shares, bool), OptimizationError> {
    Err(OptimizationError::SolverUnavailable)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
