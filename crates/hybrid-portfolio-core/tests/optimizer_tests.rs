use hybrid_portfolio_core::analytics::frontier::sample_efficient_frontier;
use hybrid_portfolio_core::classical::mean_variance::{analytic_or_uniform, analytic_weights};
use hybrid_portfolio_core::classical::refiner::{refine, RefinementMode, RefinerConstraints};
use hybrid_portfolio_core::hybrid::diversification::enforce_diversification;
use hybrid_portfolio_core::hybrid::orchestrator::{
    optimize_hybrid, optimize_portfolio, HybridPath, OptimizationMethod,
};
use hybrid_portfolio_core::quantum::allocator::{allocate_shares, shares_to_weights, AllocationPath};
use hybrid_portfolio_core::{
    AssetUniverse, OptimizerPolicy, RiskPreference, ShareConstraints, SolverCapability,
    WeightConstraints,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

// ===========================================================================
// Optimization pipeline tests
// End-to-end behaviour of allocator -> refiner -> enforcer on small universes.
// ===========================================================================

fn diagonal_universe(returns: &[f64], vols: &[f64]) -> AssetUniverse {
    let n = returns.len();
    let symbols = (0..n).map(|i| format!("A{}", i)).collect();
    let covariance = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| if i == j { vols[i] * vols[i] } else { 0.0 })
                .collect()
        })
        .collect();
    AssetUniverse::new(symbols, returns.to_vec(), covariance).unwrap()
}

fn assert_simplex(weights: &[f64]) {
    let total: f64 = weights.iter().sum();
    assert!((total - 1.0).abs() < 1e-6, "weights sum to {}", total);
    for w in weights {
        assert!((0.0..=1.0 + 1e-9).contains(w), "weight {} out of range", w);
    }
}

// ---------------------------------------------------------------------------
// 1. Integer allocator
// ---------------------------------------------------------------------------

#[test]
fn test_bit_ceiling_forces_uniform_fallback() {
    // 6 assets x 2 bits = 12 > 10
    let universe = diagonal_universe(&[0.1; 6], &[0.2; 6]);
    let constraints = ShareConstraints::uniform(vec![50.0; 6], 10_000.0, 3);
    let outcome = allocate_shares(
        &universe,
        RiskPreference(0.5),
        Some(&constraints),
        SolverCapability::Available,
        &OptimizerPolicy::default(),
    );
    assert_eq!(outcome.path, AllocationPath::UniformFallback);
    assert!(outcome.shares.iter().all(|s| *s >= 1));
}

#[test]
fn test_zero_shares_give_uniform_weights() {
    assert_eq!(shares_to_weights(&[0, 0, 0, 0], &[10.0, 20.0, 30.0, 40.0]), vec![0.25; 4]);
    assert_eq!(shares_to_weights(&[1, 2], &[0.0, 0.0]), vec![0.5; 2]);
}

#[cfg(feature = "qaoa")]
#[test]
fn test_qaoa_allocation_within_bounds() {
    let universe = diagonal_universe(&[0.12, 0.08, 0.15], &[0.2, 0.1, 0.3]);
    let constraints = ShareConstraints::uniform(vec![100.0, 50.0, 25.0], 10_000.0, 3);
    let outcome = allocate_shares(
        &universe,
        RiskPreference(0.5),
        Some(&constraints),
        SolverCapability::Available,
        &OptimizerPolicy::default(),
    );
    assert_eq!(outcome.path, AllocationPath::Qaoa);
    assert_eq!(outcome.shares.len(), 3);
    assert!(outcome.shares.iter().all(|s| *s <= 3));
}

// ---------------------------------------------------------------------------
// 2. Refiner and enforcer
// ---------------------------------------------------------------------------

#[test]
fn test_analytic_mode_favors_better_ratio() {
    let universe = diagonal_universe(&[0.10, 0.20], &[0.2, 0.3]);
    let w = analytic_weights(&universe, RiskPreference(0.5)).unwrap();
    // mu/sigma^2: 2.5 vs 2.22
    assert!(w[0] > w[1]);
    assert_simplex(&w);
}

#[test]
fn test_concentrated_weight_capped() {
    let universe = diagonal_universe(&[0.1, 0.1, 0.1, 0.1], &[0.2; 4]);
    let (w, report) = enforce_diversification(
        &[0.90, 0.05, 0.03, 0.02],
        &universe,
        &OptimizerPolicy::default(),
    );
    assert_eq!(report.capped_asset, Some(0));
    assert!((w[0] - 0.35).abs() < 1e-12);
    // excess 0.55 shared 5:3:2
    assert!((w[1] - 0.325).abs() < 1e-12);
    assert!((w[2] - 0.195).abs() < 1e-12);
    assert!((w[3] - 0.130).abs() < 1e-12);
    assert!(report.rebalance.is_none());
}

// ---------------------------------------------------------------------------
// 3. Orchestrator
// ---------------------------------------------------------------------------

#[test]
fn test_hybrid_without_solver_is_classical_only() {
    let universe = diagonal_universe(&[0.10, 0.12, 0.08], &[0.15, 0.2, 0.1]);
    let outcome = optimize_hybrid(
        &universe,
        RiskPreference(0.5),
        None,
        SolverCapability::Unavailable,
        &OptimizerPolicy::default(),
    )
    .unwrap();
    assert_eq!(outcome.path, HybridPath::ClassicalOnly);
    assert!(outcome.allocation.is_none());
    assert_simplex(&outcome.weights);
}

#[test]
fn test_mpt_matches_analytic_weights() {
    let universe = diagonal_universe(&[0.05, 0.25, 0.10], &[0.1, 0.2, 0.15]);
    let sc = ShareConstraints::uniform(vec![120.0, 40.0, 75.0], 5_000.0, 3);
    let result = optimize_portfolio(
        OptimizationMethod::Mpt,
        &universe,
        RiskPreference(0.5),
        Some(&sc),
        SolverCapability::detect(),
        &OptimizerPolicy::default(),
    )
    .unwrap();
    assert_eq!(result.weights, analytic_or_uniform(&universe, RiskPreference(0.5)));
    assert_eq!(result.refinement_mode, Some(RefinementMode::Analytic));
    assert!(result.hybrid.is_none());
}

#[test]
fn test_refiner_respects_weight_bounds() {
    let universe = diagonal_universe(&[0.05, 0.25, 0.10], &[0.1, 0.2, 0.15]);
    let constraints = RefinerConstraints {
        weight_bounds: Some(WeightConstraints::uniform(3, 0.1, 0.5)),
        ..Default::default()
    };
    let r = refine(
        &universe,
        RiskPreference(0.5),
        Some(&constraints),
        &OptimizerPolicy::default(),
    );
    assert_eq!(r.mode, RefinementMode::Bounded);
    assert_simplex(&r.weights);
    for w in &r.weights {
        assert!(*w >= 0.1 - 1e-6 && *w <= 0.5 + 1e-6, "weight {}", w);
    }
}

#[test]
fn test_invalid_risk_rejected() {
    let universe = diagonal_universe(&[0.1, 0.2], &[0.2, 0.3]);
    let result = optimize_portfolio(
        OptimizationMethod::Hybrid,
        &universe,
        RiskPreference(1.5),
        None,
        SolverCapability::Unavailable,
        &OptimizerPolicy::default(),
    );
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// 4. Frontier
// ---------------------------------------------------------------------------

#[test]
fn test_frontier_reproducible_and_monotone() {
    let universe = diagonal_universe(&[0.05, 0.10, 0.15, 0.20], &[0.1, 0.15, 0.2, 0.3]);
    let a = sample_efficient_frontier(&universe, 200, 42, 0.02);
    let b = sample_efficient_frontier(&universe, 200, 42, 0.02);
    assert_eq!(a, b);
    assert!(!a.is_empty());
    for pair in a.windows(2) {
        assert!(pair[1].risk >= pair[0].risk);
        assert!(pair[1].ret > pair[0].ret);
    }
}

// ---------------------------------------------------------------------------
// 5. Invariants
// ---------------------------------------------------------------------------

fn method_strategy() -> impl Strategy<Value = OptimizationMethod> {
    prop_oneof![
        Just(OptimizationMethod::Mpt),
        Just(OptimizationMethod::Qaoa),
        Just(OptimizationMethod::Hybrid),
    ]
}

fn asset_strategy() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.01f64..0.30, 0.05f64..0.50), 2..=5)
}

fn capability(quantum: bool) -> SolverCapability {
    if quantum {
        SolverCapability::detect()
    } else {
        SolverCapability::Unavailable
    }
}

fn universe_of(assets: &[(f64, f64)]) -> AssetUniverse {
    let returns: Vec<f64> = assets.iter().map(|a| a.0).collect();
    let vols: Vec<f64> = assets.iter().map(|a| a.1).collect();
    diagonal_universe(&returns, &vols)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_weights_on_simplex(
        assets in asset_strategy(),
        risk in 0.0f64..=1.0,
        method in method_strategy(),
        quantum in any::<bool>(),
    ) {
        let universe = universe_of(&assets);
        let result = optimize_portfolio(
            method,
            &universe,
            RiskPreference(risk),
            None,
            capability(quantum),
            &OptimizerPolicy::default(),
        )
        .unwrap();
        let total: f64 = result.weights.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-6);
        for w in &result.weights {
            prop_assert!(w.is_finite());
            prop_assert!(*w >= 0.0 && *w <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn prop_weights_on_simplex_with_share_constraints(
        assets in asset_strategy(),
        prices in prop::collection::vec(10.0f64..500.0, 5),
        budget in 500.0f64..50_000.0,
        max_shares in 0u32..=4,
        risk in 0.0f64..=1.0,
        method in method_strategy(),
        quantum in any::<bool>(),
    ) {
        let universe = universe_of(&assets);
        let sc = ShareConstraints::uniform(prices[..assets.len()].to_vec(), budget, max_shares);
        let result = optimize_portfolio(
            method,
            &universe,
            RiskPreference(risk),
            Some(&sc),
            capability(quantum),
            &OptimizerPolicy::default(),
        )
        .unwrap();
        prop_assert_eq!(result.weights.len(), assets.len());
        let total: f64 = result.weights.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-6, "weights sum to {}", total);
        for w in &result.weights {
            prop_assert!(w.is_finite());
            prop_assert!(*w >= 0.0 && *w <= 1.0 + 1e-9);
        }
        if let Some(alloc) = result.hybrid.as_ref().and_then(|h| h.allocation.as_ref()) {
            prop_assert_eq!(alloc.shares.len(), assets.len());
        }
    }

    #[test]
    fn prop_bounded_refinement_within_bounds(
        assets in asset_strategy(),
        spans in prop::collection::vec((0.0f64..=1.0, 0.0f64..=1.0), 5),
        risk in 0.0f64..=1.0,
    ) {
        let n = assets.len();
        let universe = universe_of(&assets);
        // sum of minimums <= 0.5 and sum of maximums >= 1.5
        let floor = 0.5 / n as f64;
        let ceiling = (1.5 / n as f64).min(1.0);
        let bounds = WeightConstraints {
            min_weights: spans[..n].iter().map(|(a, _)| a * floor).collect(),
            max_weights: spans[..n].iter().map(|(_, b)| ceiling + b * (1.0 - ceiling)).collect(),
        };
        let constraints = RefinerConstraints {
            weight_bounds: Some(bounds.clone()),
            ..Default::default()
        };
        let r = refine(&universe, RiskPreference(risk), Some(&constraints), &OptimizerPolicy::default());
        prop_assert_eq!(r.mode, RefinementMode::Bounded);
        let total: f64 = r.weights.iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-6, "weights sum to {}", total);
        for (i, w) in r.weights.iter().enumerate() {
            prop_assert!(w.is_finite());
            prop_assert!(
                *w >= bounds.min_weights[i] - 1e-6 && *w <= bounds.max_weights[i] + 1e-6,
                "weight {} outside [{}, {}]",
                w,
                bounds.min_weights[i],
                bounds.max_weights[i]
            );
        }
    }
}
