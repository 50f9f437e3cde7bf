use tracing::warn;

use crate::analytics::metrics::{portfolio_variance, vec_dot};
use crate::error::OptimizationError;
use crate::policy::OptimizerPolicy;
use crate::types::{AssetUniverse, RiskPreference, ShareConstraints, Shares};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Bounded-integer encoding of per-asset share counts as binary variables.
///
/// `shares[i] = min_shares[i] + sum_b coefficients[i][b] * x[i][b]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareEncoding {
    pub min_shares: Vec<u32>,
    /// Upper bounds after any 2-bit tightening.
    pub max_shares: Vec<u32>,
    pub coefficients: Vec<Vec<u32>>,
    /// True when `max_shares` had to be tightened to fit the per-asset ceiling.
    pub tightened: bool,
}

/// Quadratic unconstrained binary optimization problem (minimization).
///
/// `f(x) = offset + sum_u linear[u] x_u + sum_{u<v} quadratic[u][v] x_u x_v`
#[derive(Debug, Clone, PartialEq)]
pub struct Qubo {
    pub offset: f64,
    pub linear: Vec<f64>,
    /// Strictly upper-triangular coupling matrix.
    pub quadratic: Vec<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Minimum number of bits able to represent `levels` distinct values.
pub fn required_bits(levels: u64) -> u32 {
    if levels <= 1 {
        0
    } else {
        64 - (levels - 1).leading_zeros()
    }
}

/// Binary-expansion coefficients for an integer offset in `[0, range]`.
///
/// Powers of two except the last, which is trimmed so the all-ones string
/// decodes to exactly `range`.
fn expansion_coefficients(range: u32) -> Vec<u32> {
    let bits = required_bits(range as u64 + 1);
    if bits == 0 {
        return Vec::new();
    }
    let mut coeffs: Vec<u32> = (0..bits - 1).map(|b| 1u32 << b).collect();
    let covered: u32 = (1u32 << (bits - 1)) - 1;
    coeffs.push(range - covered);
    coeffs
}

impl ShareEncoding {
    /// Encode the share ranges, enforcing the per-asset and joint bit ceilings.
    pub fn build(
        constraints: &ShareConstraints,
        policy: &OptimizerPolicy,
    ) -> Result<Self, OptimizationError> {
        let min_shares = constraints.min_shares.clone();
        let mut max_shares = constraints.max_shares.clone();

        let widths = |maxs: &[u32]| -> Vec<u32> {
            min_shares
                .iter()
                .zip(maxs.iter())
                .map(|(lo, hi)| required_bits(hi.saturating_sub(*lo) as u64 + 1))
                .collect()
        };

        let mut bits = widths(&max_shares);
        let mut tightened = false;
        if bits.iter().any(|b| *b > policy.max_bits_per_asset) {
            let levels = (1u32 << policy.max_bits_per_asset) - 1;
            let adjusted: Vec<u32> = max_shares
                .iter()
                .zip(min_shares.iter())
                .map(|(hi, lo)| (*hi).min(lo.saturating_add(levels)))
                .collect();
            warn!(
                before = ?max_shares,
                after = ?adjusted,
                "Tightening max_shares to enforce {}-bit encoding",
                policy.max_bits_per_asset
            );
            max_shares = adjusted;
            bits = widths(&max_shares);
            tightened = true;
        }

        let total: u32 = bits.iter().sum();
        if total > policy.max_total_bits {
            return Err(OptimizationError::SizingOverflow {
                required_bits: total,
                max_bits: policy.max_total_bits,
            });
        }

        let coefficients = min_shares
            .iter()
            .zip(max_shares.iter())
            .map(|(lo, hi)| expansion_coefficients(hi - lo))
            .collect();

        Ok(ShareEncoding {
            min_shares,
            max_shares,
            coefficients,
            tightened,
        })
    }

    pub fn num_vars(&self) -> usize {
        self.coefficients.iter().map(|c| c.len()).sum()
    }

    /// Decode a bitstring (bit `u` of `state` is variable `u`) into shares.
    pub fn decode(&self, state: usize) -> Shares {
        let mut u = 0usize;
        self.coefficients
            .iter()
            .zip(self.min_shares.iter())
            .map(|(coeffs, lo)| {
                let mut s = *lo;
                for c in coeffs {
                    if state >> u & 1 == 1 {
                        s += c;
                    }
                    u += 1;
                }
                s
            })
            .collect()
    }

    /// Flattened `(asset, coefficient)` per binary variable.
    fn variables(&self) -> Vec<(usize, f64)> {
        self.coefficients
            .iter()
            .enumerate()
            .flat_map(|(i, coeffs)| coeffs.iter().map(move |c| (i, *c as f64)))
            .collect()
    }

    /// Expand the share objective into a QUBO over the encoding's variables.
    ///
    /// The aggregate budget is not part of the problem: only the per-asset
    /// bounds carried by the encoding limit share counts.
    #[allow(clippy::needless_range_loop)]
    pub fn to_qubo(&self, universe: &AssetUniverse, risk: RiskPreference) -> Qubo {
        let n = universe.len();
        let mu = &universe.returns;
        let sigma = &universe.covariance;
        let penalty = risk.variance_penalty();
        let lo: Vec<f64> = self.min_shares.iter().map(|s| *s as f64).collect();

        let offset = -vec_dot(mu, &lo) + penalty * portfolio_variance(&lo, sigma);

        let vars = self.variables();
        let m = vars.len();
        let mut linear = vec![0.0; m];
        let mut quadratic = vec![vec![0.0; m]; m];

        for (u, &(i, cu)) in vars.iter().enumerate() {
            let cross: f64 = (0..n).map(|j| (sigma[i][j] + sigma[j][i]) * lo[j]).sum();
            linear[u] = -mu[i] * cu + penalty * cu * cross + penalty * sigma[i][i] * cu * cu;
            for v in (u + 1)..m {
                let (j, cv) = vars[v];
                quadratic[u][v] = penalty * (sigma[i][j] + sigma[j][i]) * cu * cv;
            }
        }

        Qubo {
            offset,
            linear,
            quadratic,
        }
    }
}

/// Integer objective `-mu's + penalty * s' Sigma s` evaluated directly.
pub fn share_objective(shares: &[u32], universe: &AssetUniverse, risk: RiskPreference) -> f64 {
    let s: Vec<f64> = shares.iter().map(|x| *x as f64).collect();
    -vec_dot(&universe.returns, &s) + risk.variance_penalty() * portfolio_variance(&s, &universe.covariance)
}

// ---------------------------------------------------------------------------
// QUBO evaluation
// ---------------------------------------------------------------------------

impl Qubo {
    pub fn num_vars(&self) -> usize {
        self.linear.len()
    }

    /// Objective value of the bitstring `state`.
    pub fn evaluate(&self, state: usize) -> f64 {
        let m = self.num_vars();
        let bit = |u: usize| state >> u & 1 == 1;
        let mut value = self.offset;
        for u in (0..m).filter(|&u| bit(u)) {
            value += self.linear[u];
            for v in ((u + 1)..m).filter(|&v| bit(v)) {
                value += self.quadratic[u][v];
            }
        }
        value
    }

    /// Objective value of every bitstring, indexed by state.
    pub fn energy_landscape(&self) -> Vec<f64> {
        (0..1usize << self.num_vars()).map(|s| self.evaluate(s)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn universe() -> AssetUniverse {
        AssetUniverse::new(
            vec!["A".into(), "B".into()],
            vec![0.12, 0.08],
            vec![vec![0.04, 0.006], vec![0.006, 0.01]],
        )
        .unwrap()
    }

    fn constraints(min: Vec<u32>, max: Vec<u32>) -> ShareConstraints {
        ShareConstraints {
            prices: vec![100.0; min.len()],
            budget: 1_000.0,
            min_shares: min,
            max_shares: max,
        }
    }

    #[test]
    fn test_required_bits() {
        assert_eq!(required_bits(0), 0);
        assert_eq!(required_bits(1), 0);
        assert_eq!(required_bits(2), 1);
        assert_eq!(required_bits(3), 2);
        assert_eq!(required_bits(4), 2);
        assert_eq!(required_bits(5), 3);
        assert_eq!(required_bits(1024), 10);
    }

    #[test]
    fn test_expansion_coefficients_cover_range() {
        assert_eq!(expansion_coefficients(0), Vec::<u32>::new());
        assert_eq!(expansion_coefficients(1), vec![1]);
        assert_eq!(expansion_coefficients(2), vec![1, 1]);
        assert_eq!(expansion_coefficients(3), vec![1, 2]);
        assert_eq!(expansion_coefficients(6), vec![1, 2, 3]);
    }

    #[test]
    fn test_tightening_to_two_bits() {
        let enc = ShareEncoding::build(
            &constraints(vec![0, 2], vec![100, 4]),
            &OptimizerPolicy::default(),
        )
        .unwrap();
        assert!(enc.tightened);
        assert_eq!(enc.max_shares, vec![3, 4]);
        assert_eq!(enc.num_vars(), 4);
    }

    #[test]
    fn test_sizing_overflow() {
        let c = constraints(vec![0; 6], vec![3; 6]);
        let err = ShareEncoding::build(&c, &OptimizerPolicy::default()).unwrap_err();
        assert_eq!(
            err,
            OptimizationError::SizingOverflow {
                required_bits: 12,
                max_bits: 10
            }
        );
    }

    #[test]
    fn test_decode_stays_in_bounds() {
        let enc = ShareEncoding::build(
            &constraints(vec![1, 0], vec![3, 3]),
            &OptimizerPolicy::default(),
        )
        .unwrap();
        for state in 0..1usize << enc.num_vars() {
            let shares = enc.decode(state);
            assert!(shares[0] >= 1 && shares[0] <= 3);
            assert!(shares[1] <= 3);
        }
        assert_eq!(enc.decode((1 << enc.num_vars()) - 1), vec![3, 3]);
    }

    #[test]
    fn test_qubo_matches_direct_objective() {
        let u = universe();
        let risk = RiskPreference(0.7);
        let enc = ShareEncoding::build(
            &constraints(vec![1, 0], vec![3, 3]),
            &OptimizerPolicy::default(),
        )
        .unwrap();
        let qubo = enc.to_qubo(&u, risk);
        for state in 0..1usize << qubo.num_vars() {
            let direct = share_objective(&enc.decode(state), &u, risk);
            assert!(
                (qubo.evaluate(state) - direct).abs() < 1e-12,
                "state {}: qubo {} vs direct {}",
                state,
                qubo.evaluate(state),
                direct
            );
        }
    }

    #[test]
    fn test_fixed_asset_has_no_variables() {
        let enc = ShareEncoding::build(
            &constraints(vec![2, 0], vec![2, 1]),
            &OptimizerPolicy::default(),
        )
        .unwrap();
        assert_eq!(enc.num_vars(), 1);
        assert_eq!(enc.decode(0), vec![2, 0]);
        assert_eq!(enc.decode(1), vec![2, 1]);
    }
}
