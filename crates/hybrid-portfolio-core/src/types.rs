use serde::{Deserialize, Serialize};

use crate::error::PortfolioError;
use crate::PortfolioResult;

/// Fractional allocation of capital, one entry per asset.
pub type Weights = Vec<f64>;

/// Whole-unit holdings, one entry per asset.
pub type Shares = Vec<u32>;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = f64;

const SYMMETRY_TOLERANCE: f64 = 1e-7;

// ---------------------------------------------------------------------------
// Asset universe
// ---------------------------------------------------------------------------

/// Ordered asset universe with annualized statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetUniverse {
    /// Asset identifiers, in the order used by every vector below.
    pub symbols: Vec<String>,
    /// Annualized expected return per asset.
    pub returns: Vec<Rate>,
    /// N x N annualized covariance matrix.
    pub covariance: Vec<Vec<f64>>,
}

impl AssetUniverse {
    pub fn new(
        symbols: Vec<String>,
        returns: Vec<Rate>,
        covariance: Vec<Vec<f64>>,
    ) -> PortfolioResult<Self> {
        let universe = AssetUniverse {
            symbols,
            returns,
            covariance,
        };
        universe.validate()?;
        Ok(universe)
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Per-asset variances (covariance diagonal).
    pub fn variances(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.covariance[i][i]).collect()
    }

    #[allow(clippy::needless_range_loop)]
    pub fn validate(&self) -> PortfolioResult<()> {
        let n = self.returns.len();
        if n == 0 {
            return Err(PortfolioError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        if self.symbols.len() != n {
            return Err(PortfolioError::invalid(
                "symbols",
                format!("Expected {} symbols but got {}", n, self.symbols.len()),
            ));
        }
        if let Some(i) = self.symbols.iter().position(|s| s.trim().is_empty()) {
            return Err(PortfolioError::invalid(
                format!("symbols[{}]", i),
                "Symbol must not be empty",
            ));
        }
        if self.returns.iter().any(|r| !r.is_finite()) {
            return Err(PortfolioError::invalid(
                "returns",
                "Expected returns must be finite",
            ));
        }
        if self.covariance.len() != n {
            return Err(PortfolioError::invalid(
                "covariance",
                format!(
                    "Expected {}x{} matrix but got {} rows",
                    n,
                    n,
                    self.covariance.len()
                ),
            ));
        }
        for (i, row) in self.covariance.iter().enumerate() {
            if row.len() != n {
                return Err(PortfolioError::invalid(
                    "covariance",
                    format!("Row {} has {} columns, expected {}", i, row.len(), n),
                ));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(PortfolioError::invalid(
                    "covariance",
                    format!("Row {} contains a non-finite entry", i),
                ));
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (self.covariance[i][j], self.covariance[j][i]);
                if (a - b).abs() > SYMMETRY_TOLERANCE {
                    return Err(PortfolioError::invalid(
                        "covariance",
                        format!("Not symmetric: [{},{}]={} != [{},{}]={}", i, j, a, j, i, b),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Risk preference
// ---------------------------------------------------------------------------

/// Investor risk preference in [0, 1]; higher is more return-seeking.
///
/// The same scalar feeds two optimizers with different meanings, so each
/// projection is exposed separately rather than unified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskPreference(pub f64);

impl RiskPreference {
    /// Map a 0-10 risk level onto [0, 1].
    pub fn from_risk_level(level: f64) -> Self {
        RiskPreference(level / 10.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Divisor used by the analytic mean-variance solution.
    pub fn risk_aversion(self) -> f64 {
        if self.0 > 0.0 {
            2.0 / self.0
        } else {
            1.0
        }
    }

    /// Multiplier on the variance term of the integer objective.
    pub fn variance_penalty(self) -> f64 {
        2.0 * self.0
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// Share-count constraints for the integer allocator and the MILP refiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareConstraints {
    /// Current price per share.
    pub prices: Vec<f64>,
    /// Total capital available.
    pub budget: f64,
    pub min_shares: Vec<u32>,
    pub max_shares: Vec<u32>,
}

impl ShareConstraints {
    /// Constraints with `[0, max_shares]` for every asset.
    pub fn uniform(prices: Vec<f64>, budget: f64, max_shares: u32) -> Self {
        let n = prices.len();
        ShareConstraints {
            prices,
            budget,
            min_shares: vec![0; n],
            max_shares: vec![max_shares; n],
        }
    }

    pub fn validate(&self, n: usize) -> PortfolioResult<()> {
        for (field, len) in [
            ("share_constraints.prices", self.prices.len()),
            ("share_constraints.min_shares", self.min_shares.len()),
            ("share_constraints.max_shares", self.max_shares.len()),
        ] {
            if len != n {
                return Err(PortfolioError::invalid(
                    field,
                    format!("Expected {} values but got {}", n, len),
                ));
            }
        }
        if self.prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(PortfolioError::invalid(
                "share_constraints.prices",
                "Prices must be finite and non-negative",
            ));
        }
        if !self.budget.is_finite() {
            return Err(PortfolioError::invalid(
                "share_constraints.budget",
                "Budget must be finite",
            ));
        }
        if let Some(i) = (0..n).find(|&i| self.max_shares[i] < self.min_shares[i]) {
            return Err(PortfolioError::invalid(
                format!("share_constraints.max_shares[{}]", i),
                "max_shares must be >= min_shares",
            ));
        }
        Ok(())
    }

    pub fn mean_price(&self) -> f64 {
        if self.prices.is_empty() {
            return 0.0;
        }
        self.prices.iter().sum::<f64>() / self.prices.len() as f64
    }
}

/// Per-asset fractional weight bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConstraints {
    pub min_weights: Vec<f64>,
    pub max_weights: Vec<f64>,
}

impl WeightConstraints {
    /// Identical `[min, max]` bounds for every asset.
    pub fn uniform(n: usize, min: f64, max: f64) -> Self {
        WeightConstraints {
            min_weights: vec![min; n],
            max_weights: vec![max; n],
        }
    }

    pub fn validate(&self, n: usize) -> PortfolioResult<()> {
        if self.min_weights.len() != n {
            return Err(PortfolioError::invalid(
                "weight_constraints.min_weights",
                format!("Expected {} values but got {}", n, self.min_weights.len()),
            ));
        }
        if self.max_weights.len() != n {
            return Err(PortfolioError::invalid(
                "weight_constraints.max_weights",
                format!("Expected {} values but got {}", n, self.max_weights.len()),
            ));
        }
        for i in 0..n {
            let (lo, hi) = (self.min_weights[i], self.max_weights[i]);
            if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) {
                return Err(PortfolioError::invalid(
                    format!("weight_constraints[{}]", i),
                    "Bounds must lie in [0, 1]",
                ));
            }
            if lo > hi {
                return Err(PortfolioError::invalid(
                    format!("weight_constraints[{}]", i),
                    "min_weight > max_weight",
                ));
            }
        }
        Ok(())
    }
}

/// Uniform `1/n` weights.
pub fn equal_weights(n: usize) -> Weights {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

// ---------------------------------------------------------------------------
// Output envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
