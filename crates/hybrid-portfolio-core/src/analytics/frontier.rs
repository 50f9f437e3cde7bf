use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::metrics::{round_dp, PortfolioMetrics};
use crate::error::PortfolioError;
use crate::policy::OptimizerPolicy;
use crate::types::{equal_weights, with_metadata, AssetUniverse, ComputationOutput};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One sampled portfolio on the risk/return plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub risk: f64,
    #[serde(rename = "return")]
    pub ret: f64,
    pub sharpe: f64,
}

impl FrontierPoint {
    /// Percent form used in reports: risk and return to 2 dp, Sharpe to 3 dp.
    pub fn to_percent(self) -> FrontierPoint {
        FrontierPoint {
            risk: round_dp(self.risk * 100.0, 2),
            ret: round_dp(self.ret * 100.0, 2),
            sharpe: round_dp(self.sharpe, 3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    pub universe: AssetUniverse,
    /// Defaults to the policy sample count.
    pub num_portfolios: Option<usize>,
    /// Defaults to the policy seed.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierOutput {
    pub points: Vec<FrontierPoint>,
    pub samples_drawn: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Draw `num_portfolios` random long-only portfolios and keep the
/// non-dominated ones.
///
/// Deterministic for a given seed.
pub fn sample_efficient_frontier(
    universe: &AssetUniverse,
    num_portfolios: usize,
    seed: u64,
    risk_free_rate: f64,
) -> Vec<FrontierPoint> {
    let n = universe.len();
    let mut rng = StdRng::seed_from_u64(seed);

    let points: Vec<FrontierPoint> = (0..num_portfolios)
        .map(|_| {
            let raw: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
            let total: f64 = raw.iter().sum();
            let weights = if total > 0.0 {
                raw.iter().map(|x| x / total).collect()
            } else {
                equal_weights(n)
            };
            let m = PortfolioMetrics::evaluate(&weights, universe, risk_free_rate);
            FrontierPoint {
                risk: m.risk,
                ret: m.expected_return,
                sharpe: m.sharpe,
            }
        })
        .collect();

    retain_non_dominated(points)
}

/// Sort by risk and keep each point whose return strictly exceeds every
/// lower-risk point's return.
pub fn retain_non_dominated(mut points: Vec<FrontierPoint>) -> Vec<FrontierPoint> {
    points.sort_by(|a, b| {
        a.risk
            .partial_cmp(&b.risk)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut best = f64::NEG_INFINITY;
    points
        .into_iter()
        .filter(|p| {
            if p.ret > best {
                best = p.ret;
                true
            } else {
                false
            }
        })
        .collect()
}

/// Frontier wrapped in the computation envelope.
pub fn run_frontier(
    input: &FrontierInput,
    policy: &OptimizerPolicy,
) -> PortfolioResult<ComputationOutput<FrontierOutput>> {
    let start = Instant::now();
    input.universe.validate()?;
    let samples = input.num_portfolios.unwrap_or(policy.frontier_samples);
    if samples == 0 {
        return Err(PortfolioError::invalid(
            "num_portfolios",
            "At least one portfolio must be sampled",
        ));
    }
    let seed = input.seed.unwrap_or(policy.frontier_seed);
    let points = sample_efficient_frontier(&input.universe, samples, seed, policy.risk_free_rate);

    let mut warnings = Vec::new();
    if points.len() < 3 {
        warnings.push(format!(
            "Only {} non-dominated portfolios found in {} samples",
            points.len(),
            samples
        ));
    }

    let assumptions = serde_json::json!({
        "num_portfolios": samples,
        "seed": seed,
        "risk_free_rate": policy.risk_free_rate,
        "long_only": true,
    });

    Ok(with_metadata(
        "Monte Carlo efficient frontier (uniform random weights, non-dominated filter)",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        FrontierOutput {
            points,
            samples_drawn: samples,
        },
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
