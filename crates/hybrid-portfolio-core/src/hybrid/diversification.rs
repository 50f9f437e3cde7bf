use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classical::mean_variance::normalize_weights;
use crate::policy::OptimizerPolicy;
use crate::types::{AssetUniverse, Weights};

const SCORE_EPSILON: f64 = 1e-8;

/// Corrections applied by [`enforce_diversification`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiversificationReport {
    /// Asset whose weight was cut to the concentration cap.
    pub capped_asset: Option<usize>,
    pub rebalance: Option<Rebalance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rebalance {
    /// Equal weight across the assets that already carried weight.
    SelectedAssets { assets: Vec<usize> },
    /// Equal weight across the best return-per-volatility assets.
    TopRanked { assets: Vec<usize> },
}

impl DiversificationReport {
    pub fn is_unchanged(&self) -> bool {
        self.capped_asset.is_none() && self.rebalance.is_none()
    }
}

/// Cap a dominant position and spread an under-diversified portfolio.
///
/// The largest weight above `concentration_trigger` is cut to
/// `concentration_cap` with the excess shared pro rata. Then, if no more than
/// two weights exceed `active_weight_threshold` (and n >= 3), the portfolio
/// is rebuilt as an equal-weight basket.
pub fn enforce_diversification(
    weights: &[f64],
    universe: &AssetUniverse,
    policy: &OptimizerPolicy,
) -> (Weights, DiversificationReport) {
    let n = weights.len();
    let mut w = weights.to_vec();
    let mut report = DiversificationReport::default();
    if n == 0 {
        return (w, report);
    }

    // Concentration cap
    let (max_idx, max_w) = w
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (i, x)| if x > acc.1 { (i, x) } else { acc });
    if max_w > policy.concentration_trigger {
        let excess = max_w - policy.concentration_cap;
        w[max_idx] = policy.concentration_cap;
        if n > 1 {
            let others: f64 = (0..n).filter(|&j| j != max_idx).map(|j| w[j]).sum();
            for j in (0..n).filter(|&j| j != max_idx) {
                w[j] += if others > 0.0 {
                    excess * w[j] / others
                } else {
                    excess / (n - 1) as f64
                };
            }
        }
        normalize_weights(&mut w);
        info!(asset = max_idx, from = max_w, "Concentration cap applied");
        report.capped_asset = Some(max_idx);
    }

    // Under-diversification
    let active = w.iter().filter(|x| **x > policy.active_weight_threshold).count();
    if active <= 2 && n >= 3 {
        let selected: Vec<usize> = (0..n)
            .filter(|&i| w[i] > policy.selected_weight_threshold)
            .collect();
        let basket = if selected.len() >= 3 {
            Rebalance::SelectedAssets { assets: selected }
        } else {
            Rebalance::TopRanked {
                assets: top_ranked(universe, policy.fallback_top_assets.min(n)),
            }
        };
        let assets = match &basket {
            Rebalance::SelectedAssets { assets } | Rebalance::TopRanked { assets } => assets,
        };
        let share = 1.0 / assets.len().max(1) as f64;
        w = vec![0.0; n];
        for &i in assets {
            w[i] = share;
        }
        info!(?basket, "Under-diversified portfolio rebalanced");
        report.rebalance = Some(basket);
    }

    (w, report)
}

/// Indices of the `k` best `return / (volatility + eps)` assets, ties kept in
/// universe order.
fn top_ranked(universe: &AssetUniverse, k: usize) -> Vec<usize> {
    let scores: Vec<f64> = universe
        .returns
        .iter()
        .zip(universe.variances())
        .map(|(r, var)| r / (var.max(0.0).sqrt() + SCORE_EPSILON))
        .collect();
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(k);
    order
}
