use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::AssetUniverse;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Risk/return summary of one weight vector, in fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub expected_return: f64,
    /// Standard deviation of portfolio return.
    pub risk: f64,
    pub sharpe: f64,
}

/// Report form of [`PortfolioMetrics`]: return and risk in percent rounded to
/// 2 dp, Sharpe rounded to 3 dp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "return")]
    pub ret: f64,
    pub risk: f64,
    pub sharpe: f64,
}

impl PortfolioMetrics {
    pub fn evaluate(weights: &[f64], universe: &AssetUniverse, risk_free_rate: f64) -> Self {
        let expected_return = vec_dot(weights, &universe.returns);
        let risk = portfolio_variance(weights, &universe.covariance).max(0.0).sqrt();
        PortfolioMetrics {
            expected_return,
            risk,
            sharpe: compute_sharpe(expected_return, risk_free_rate, risk),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ret: round_dp(self.expected_return * 100.0, 2),
            risk: round_dp(self.risk * 100.0, 2),
            sharpe: round_dp(self.sharpe, 3),
        }
    }
}

// ---------------------------------------------------------------------------
// Portfolio math helpers
// ---------------------------------------------------------------------------

/// Sharpe ratio with division-by-zero guard.
pub fn compute_sharpe(ret: f64, rf: f64, risk: f64) -> f64 {
    if risk > 0.0 {
        (ret - rf) / risk
    } else {
        0.0
    }
}

/// Portfolio variance: w' * Sigma * w.
pub fn portfolio_variance(w: &[f64], sigma: &[Vec<f64>]) -> f64 {
    let sigma_w = mat_vec_multiply(sigma, w);
    vec_dot(w, &sigma_w)
}

/// Matrix-vector multiplication.
pub fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Dot product.
pub fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Round half-to-even at `dp` decimal places; non-finite input maps to 0.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(dp))
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
