use serde::{Deserialize, Serialize};

use crate::error::PortfolioError;
use crate::PortfolioResult;

/// Hard ceiling on `max_total_bits`: the simulator holds `2^bits` amplitudes.
pub const MAX_SIMULATED_BITS: u32 = 20;

// ---------------------------------------------------------------------------
// Solver capability
// ---------------------------------------------------------------------------

/// Whether the heuristic quantum-style solver can be used.
///
/// Probed once at start-up and passed down; nothing below the orchestrator
/// re-probes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverCapability {
    Available,
    Unavailable,
}

impl SolverCapability {
    /// Available when the crate was built with the `qaoa` feature.
    pub fn detect() -> Self {
        if cfg!(feature = "qaoa") {
            SolverCapability::Available
        } else {
            SolverCapability::Unavailable
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, SolverCapability::Available)
    }
}

// ---------------------------------------------------------------------------
// Refinement objective
// ---------------------------------------------------------------------------

/// Objective minimized by the bounded continuous refiner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementObjective {
    /// Maximize `(w'mu - rf) / sqrt(w' Sigma w)`.
    #[default]
    MaxSharpe,
    /// Minimize `r * sigma_p - (1 - r) * mu_p` for risk preference `r`.
    RiskReturnTradeoff,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Every fixed policy constant of the optimization pipeline.
///
/// Defaults are the production values; a JSON or YAML file may override any
/// subset of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerPolicy {
    /// Annual risk-free rate used by every Sharpe computation.
    pub risk_free_rate: f64,

    // --- Diversification enforcer ---
    /// A single weight above this triggers the concentration cap.
    pub concentration_trigger: f64,
    /// Weight assigned to the capped asset.
    pub concentration_cap: f64,
    /// Weight above which an asset counts as active.
    pub active_weight_threshold: f64,
    /// Weight above which an asset counts as selected.
    pub selected_weight_threshold: f64,
    /// Number of assets picked by return/volatility when too few are selected.
    pub fallback_top_assets: usize,

    // --- Integer allocator ---
    pub max_bits_per_asset: u32,
    /// Joint qubit ceiling (2^10 = 1024 states).
    pub max_total_bits: u32,
    /// Upper share bound used when deriving constraints from a request.
    pub default_max_shares: u32,
    /// Price assumed for stocks that do not quote one.
    pub default_price: f64,
    pub qaoa_reps: usize,
    pub qaoa_max_iterations: u64,
    pub qaoa_shots: usize,
    pub qaoa_seed: u64,

    // --- Classical refiner ---
    pub hybrid_max_weight: f64,
    pub hybrid_max_iterations: u32,
    pub bounded_max_iterations: u32,
    pub bounded_tolerance: f64,
    pub milp_max_nodes: u64,
    pub refinement_objective: RefinementObjective,

    // --- Evaluation ---
    pub frontier_samples: usize,
    pub frontier_seed: u64,
    pub backtest_risk_factor: f64,
    pub training_window_years: u32,
    /// Trading days per year used to annualize daily statistics.
    pub annualization_factor: f64,
}

impl Default for OptimizerPolicy {
    fn default() -> Self {
        OptimizerPolicy {
            risk_free_rate: 0.02,
            concentration_trigger: 0.50,
            concentration_cap: 0.35,
            active_weight_threshold: 0.05,
            selected_weight_threshold: 0.001,
            fallback_top_assets: 5,
            max_bits_per_asset: 2,
            max_total_bits: 10,
            default_max_shares: 3,
            default_price: 100.0,
            qaoa_reps: 1,
            qaoa_max_iterations: 8,
            qaoa_shots: 1024,
            qaoa_seed: 42,
            hybrid_max_weight: 0.8,
            hybrid_max_iterations: 100,
            bounded_max_iterations: 1000,
            bounded_tolerance: 1e-9,
            milp_max_nodes: 200_000,
            refinement_objective: RefinementObjective::MaxSharpe,
            frontier_samples: 100,
            frontier_seed: 42,
            backtest_risk_factor: 5.0,
            training_window_years: 1,
            annualization_factor: 252.0,
        }
    }
}

impl OptimizerPolicy {
    /// Reject overrides the pipeline cannot run with.
    pub fn validate(&self) -> PortfolioResult<()> {
        for (field, value) in [
            ("concentration_trigger", self.concentration_trigger),
            ("concentration_cap", self.concentration_cap),
            ("hybrid_max_weight", self.hybrid_max_weight),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(PortfolioError::invalid(field, format!("Must lie in (0, 1], got {}", value)));
            }
        }
        if self.concentration_cap > self.concentration_trigger {
            return Err(PortfolioError::invalid(
                "concentration_cap",
                format!(
                    "Cap {} exceeds the trigger {}",
                    self.concentration_cap, self.concentration_trigger
                ),
            ));
        }
        for (field, value) in [
            ("active_weight_threshold", self.active_weight_threshold),
            ("selected_weight_threshold", self.selected_weight_threshold),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(PortfolioError::invalid(field, format!("Must lie in [0, 1), got {}", value)));
            }
        }
        for (field, value) in [
            ("default_price", self.default_price),
            ("bounded_tolerance", self.bounded_tolerance),
            ("backtest_risk_factor", self.backtest_risk_factor),
            ("annualization_factor", self.annualization_factor),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(PortfolioError::invalid(field, format!("Must be positive, got {}", value)));
            }
        }
        if !self.risk_free_rate.is_finite() {
            return Err(PortfolioError::invalid("risk_free_rate", "Must be finite"));
        }
        if self.max_total_bits == 0 || self.max_total_bits > MAX_SIMULATED_BITS {
            return Err(PortfolioError::invalid(
                "max_total_bits",
                format!("Must lie in [1, {}], got {}", MAX_SIMULATED_BITS, self.max_total_bits),
            ));
        }
        for (field, value) in [
            ("fallback_top_assets", self.fallback_top_assets as u64),
            ("max_bits_per_asset", self.max_bits_per_asset as u64),
            ("qaoa_reps", self.qaoa_reps as u64),
            ("qaoa_max_iterations", self.qaoa_max_iterations),
            ("qaoa_shots", self.qaoa_shots as u64),
            ("hybrid_max_iterations", self.hybrid_max_iterations as u64),
            ("bounded_max_iterations", self.bounded_max_iterations as u64),
            ("milp_max_nodes", self.milp_max_nodes),
            ("frontier_samples", self.frontier_samples as u64),
            ("training_window_years", self.training_window_years as u64),
        ] {
            if value == 0 {
                return Err(PortfolioError::invalid(field, "Must be at least 1"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_thresholds() {
        let p = OptimizerPolicy::default();
        assert_eq!(p.concentration_trigger, 0.50);
        assert_eq!(p.concentration_cap, 0.35);
        assert_eq!(p.active_weight_threshold, 0.05);
        assert_eq!(p.selected_weight_threshold, 0.001);
        assert_eq!(p.max_total_bits, 10);
        assert_eq!(p.max_bits_per_asset, 2);
        assert_eq!(p.frontier_samples, 100);
        assert_eq!(p.risk_free_rate, 0.02);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let p: OptimizerPolicy =
            serde_json::from_str(r#"{"concentration_cap": 0.30, "frontier_seed": 7}"#).unwrap();
        assert_eq!(p.concentration_cap, 0.30);
        assert_eq!(p.frontier_seed, 7);
        assert_eq!(p.concentration_trigger, 0.50);
        assert_eq!(p.refinement_objective, RefinementObjective::MaxSharpe);
    }

    #[test]
    fn test_objective_snake_case() {
        let p: OptimizerPolicy =
            serde_json::from_str(r#"{"refinement_objective": "risk_return_tradeoff"}"#).unwrap();
        assert_eq!(
            p.refinement_objective,
            RefinementObjective::RiskReturnTradeoff
        );
    }

    #[test]
    fn test_default_policy_valid() {
        assert!(OptimizerPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_cap_above_trigger_rejected() {
        let p: OptimizerPolicy =
            serde_json::from_str(r#"{"concentration_cap": 0.6, "concentration_trigger": 0.5}"#).unwrap();
        match p.validate() {
            Err(PortfolioError::InvalidInput { field, .. }) => assert_eq!(field, "concentration_cap"),
            other => panic!("expected invalid cap, got {:?}", other),
        }
    }

    #[test]
    fn test_unbounded_bit_ceiling_rejected() {
        let p: OptimizerPolicy = serde_json::from_str(r#"{"max_total_bits": 64}"#).unwrap();
        assert!(p.validate().is_err());
        let p: OptimizerPolicy = serde_json::from_str(r#"{"max_total_bits": 20}"#).unwrap();
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_zero_counts_rejected() {
        for json in [
            r#"{"qaoa_shots": 0}"#,
            r#"{"qaoa_reps": 0}"#,
            r#"{"frontier_samples": 0}"#,
            r#"{"training_window_years": 0}"#,
        ] {
            let p: OptimizerPolicy = serde_json::from_str(json).unwrap();
            assert!(p.validate().is_err(), "{}", json);
        }
    }

    #[test]
    fn test_out_of_range_fractions_rejected() {
        for json in [
            r#"{"hybrid_max_weight": 0.0}"#,
            r#"{"hybrid_max_weight": 1.5}"#,
            r#"{"active_weight_threshold": 1.0}"#,
            r#"{"default_price": -5.0}"#,
            r#"{"annualization_factor": 0.0}"#,
        ] {
            let p: OptimizerPolicy = serde_json::from_str(json).unwrap();
            assert!(p.validate().is_err(), "{}", json);
        }
    }

    #[test]
    fn test_capability_matches_feature() {
        let cap = SolverCapability::detect();
        assert_eq!(cap.is_available(), cfg!(feature = "qaoa"));
    }
}
