use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

use super::diversification::{enforce_diversification, DiversificationReport};
use crate::analytics::metrics::PortfolioMetrics;
use crate::classical::mean_variance::analytic_or_uniform;
use crate::classical::refiner::{refine_bounded, RefinementMode};
use crate::error::PortfolioError;
use crate::policy::{OptimizerPolicy, SolverCapability};
use crate::quantum::allocator::{allocate_shares, shares_to_weights, AllocationOutcome};
use crate::types::{
    equal_weights, with_metadata, AssetUniverse, ComputationOutput, RiskPreference,
    ShareConstraints, WeightConstraints, Weights,
};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Optimization method selected by a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptimizationMethod {
    Qaoa,
    Mpt,
    #[default]
    Hybrid,
}

impl OptimizationMethod {
    /// Human-readable method label reported with results.
    pub fn label(self) -> &'static str {
        match self {
            OptimizationMethod::Qaoa => {
                "QAOA 2-bit + MPT (Quantum Integer Optimization + Classical Refinement)"
            }
            OptimizationMethod::Mpt => "MPT (Modern Portfolio Theory)",
            OptimizationMethod::Hybrid => {
                "Hybrid QAOA+MPT (Quantum Integer Optimization + Classical Refinement)"
            }
        }
    }
}

impl FromStr for OptimizationMethod {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QAOA" => Ok(OptimizationMethod::Qaoa),
            "MPT" => Ok(OptimizationMethod::Mpt),
            "HYBRID" => Ok(OptimizationMethod::Hybrid),
            other => Err(PortfolioError::invalid(
                "method",
                format!("Unknown optimization method '{}'", other),
            )),
        }
    }
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptimizationMethod::Qaoa => "QAOA",
            OptimizationMethod::Mpt => "MPT",
            OptimizationMethod::Hybrid => "HYBRID",
        };
        f.write_str(s)
    }
}

/// Route the orchestrator took to its weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridPath {
    /// Solver unavailable: analytic refinement only.
    ClassicalOnly,
    /// Integer allocation refined by the bounded solver.
    Refined,
    /// Bounded solver hit its cap; allocator weights kept.
    SeedRetained,
    /// Bounded solver failed; analytic refinement used instead.
    AnalyticFallback,
}

/// Result of the hybrid pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridOutcome {
    pub weights: Weights,
    pub path: HybridPath,
    pub allocation: Option<AllocationOutcome>,
    /// Weights before diversification enforcement.
    pub refined_weights: Weights,
    pub diversification: DiversificationReport,
    pub warnings: Vec<String>,
}

/// Final weights for any method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioOptimization {
    pub method: OptimizationMethod,
    pub weights: Weights,
    pub metrics: PortfolioMetrics,
    /// Set for QAOA and HYBRID.
    pub hybrid: Option<HybridOutcome>,
    /// Set for MPT.
    pub refinement_mode: Option<RefinementMode>,
    pub warnings: Vec<String>,
}

/// Input to a universe-level optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationInput {
    pub universe: AssetUniverse,
    pub risk_preference: RiskPreference,
    #[serde(default)]
    pub method: OptimizationMethod,
    #[serde(default)]
    pub share_constraints: Option<ShareConstraints>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Integer allocation -> bounded refinement -> diversification enforcement.
///
/// Refinement runs over `[0, hybrid_max_weight]` for every asset. Stage
/// failures are absorbed; only invalid input is returned as an error.
pub fn optimize_hybrid(
    universe: &AssetUniverse,
    risk: RiskPreference,
    share_constraints: Option<&ShareConstraints>,
    capability: SolverCapability,
    policy: &OptimizerPolicy,
) -> PortfolioResult<HybridOutcome> {
    validate(universe, risk, share_constraints)?;
    let n = universe.len();
    let mut warnings = Vec::new();

    let (refined_weights, path, allocation) = if !capability.is_available() {
        info!("Quantum-style solver unavailable; using analytic refinement");
        warnings.push("Quantum-style solver unavailable; classical refinement only".to_string());
        (
            analytic_or_uniform(universe, risk),
            HybridPath::ClassicalOnly,
            None,
        )
    } else {
        let allocation = allocate_shares(universe, risk, share_constraints, capability, policy);
        if let Some(reason) = &allocation.fallback_reason {
            warnings.push(format!("Uniform share fallback used: {}", reason));
        }
        let seed = match share_constraints {
            Some(sc) => shares_to_weights(&allocation.shares, &sc.prices),
            None => equal_weights(n),
        };

        let bounds = WeightConstraints::uniform(n, 0.0, policy.hybrid_max_weight);
        let refinement = refine_bounded(
            universe,
            risk,
            &bounds,
            &seed,
            policy.hybrid_max_iterations,
            policy,
        );
        let path = match (refinement.mode, refinement.converged) {
            (RefinementMode::Bounded, true) => HybridPath::Refined,
            (RefinementMode::Bounded, false) => HybridPath::SeedRetained,
            _ => HybridPath::AnalyticFallback,
        };
        warnings.extend(
            refinement
                .fallbacks
                .iter()
                .map(|f| format!("Refinement fallback: {}", f)),
        );
        (refinement.weights, path, Some(allocation))
    };

    let (weights, diversification) = enforce_diversification(&refined_weights, universe, policy);
    if let Some(i) = diversification.capped_asset {
        warnings.push(format!(
            "Position in {} capped at {:.0}%",
            universe.symbols[i],
            policy.concentration_cap * 100.0
        ));
    }
    if diversification.rebalance.is_some() {
        warnings.push("Under-diversified result rebalanced to equal weights".to_string());
    }

    info!(?path, "Hybrid optimization finished");
    Ok(HybridOutcome {
        weights,
        path,
        allocation,
        refined_weights,
        diversification,
        warnings,
    })
}

/// Dispatch on the method: MPT takes the unconstrained analytic weights
/// alone; QAOA and HYBRID run the hybrid pipeline.
pub fn optimize_portfolio(
    method: OptimizationMethod,
    universe: &AssetUniverse,
    risk: RiskPreference,
    share_constraints: Option<&ShareConstraints>,
    capability: SolverCapability,
    policy: &OptimizerPolicy,
) -> PortfolioResult<PortfolioOptimization> {
    let (weights, hybrid, refinement_mode, warnings) = match method {
        OptimizationMethod::Mpt => {
            validate(universe, risk, share_constraints)?;
            let weights = analytic_or_uniform(universe, risk);
            (weights, None, Some(RefinementMode::Analytic), Vec::new())
        }
        OptimizationMethod::Qaoa | OptimizationMethod::Hybrid => {
            let outcome = optimize_hybrid(universe, risk, share_constraints, capability, policy)?;
            let warnings = outcome.warnings.clone();
            (outcome.weights.clone(), Some(outcome), None, warnings)
        }
    };

    for w in &warnings {
        warn!("{}", w);
    }
    let metrics = PortfolioMetrics::evaluate(&weights, universe, policy.risk_free_rate);
    Ok(PortfolioOptimization {
        method,
        weights,
        metrics,
        hybrid,
        refinement_mode,
        warnings,
    })
}

/// Universe-level optimization wrapped in the computation envelope.
pub fn run_optimization(
    input: &OptimizationInput,
    capability: SolverCapability,
    policy: &OptimizerPolicy,
) -> PortfolioResult<ComputationOutput<PortfolioOptimization>> {
    let start = Instant::now();
    let result = optimize_portfolio(
        input.method,
        &input.universe,
        input.risk_preference,
        input.share_constraints.as_ref(),
        capability,
        policy,
    )?;
    let assumptions = serde_json::json!({
        "solver_capability": capability,
        "risk_preference": input.risk_preference,
        "risk_free_rate": policy.risk_free_rate,
        "hybrid_max_weight": policy.hybrid_max_weight,
        "concentration_trigger": policy.concentration_trigger,
        "concentration_cap": policy.concentration_cap,
    });
    let warnings = result.warnings.clone();
    Ok(with_metadata(
        input.method.label(),
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(
    universe: &AssetUniverse,
    risk: RiskPreference,
    share_constraints: Option<&ShareConstraints>,
) -> PortfolioResult<()> {
    universe.validate()?;
    if !(0.0..=1.0).contains(&risk.value()) {
        return Err(PortfolioError::invalid(
            "risk_preference",
            "Risk preference must be in [0, 1]",
        ));
    }
    if let Some(s) = share_constraints {
        s.validate(universe.len())?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
