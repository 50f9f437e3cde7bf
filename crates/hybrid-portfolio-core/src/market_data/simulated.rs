use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::types::AssetUniverse;
use crate::PortfolioResult;

const BASE_RETURN: f64 = 0.05;
const RETURN_PER_RISK: f64 = 0.15;
const VOL_PER_RISK: f64 = 0.30;
const MIN_CORRELATION: f64 = 0.3;
const MAX_CORRELATION: f64 = 0.7;

/// Seed derived from the symbols: sum of their characters modulo 10000.
pub fn symbol_seed(symbols: &[String]) -> u64 {
    symbols
        .iter()
        .flat_map(|s| s.chars())
        .map(|c| c as u64)
        .sum::<u64>()
        % 10_000
}

/// Synthetic statistics from per-asset risk levels (0-100).
///
/// `return = 0.05 + level/100 * 0.15`, `vol = level/100 * 0.3`, pairwise
/// correlations uniform in [0.3, 0.7]. Reproducible for the same symbols.
pub fn simulated_statistics(symbols: &[String], risk_levels: &[f64]) -> PortfolioResult<AssetUniverse> {
    let n = symbols.len();
    let mut rng = StdRng::seed_from_u64(symbol_seed(symbols));

    let returns: Vec<f64> = risk_levels
        .iter()
        .map(|l| BASE_RETURN + l / 100.0 * RETURN_PER_RISK)
        .collect();
    let vols: Vec<f64> = risk_levels.iter().map(|l| l / 100.0 * VOL_PER_RISK).collect();

    let mut corr = vec![vec![0.0; n]; n];
    for row in corr.iter_mut() {
        for c in row.iter_mut() {
            *c = rng.gen_range(MIN_CORRELATION..MAX_CORRELATION);
        }
    }
    let mut covariance = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let rho = if i == j {
                1.0
            } else {
                (corr[i][j] + corr[j][i]) / 2.0
            };
            covariance[i][j] = rho * vols[i] * vols[j];
        }
    }

    AssetUniverse::new(symbols.to_vec(), returns, covariance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn syms() -> Vec<String> {
        vec!["AAPL".into(), "MSFT".into(), "GOOG".into()]
    }

    #[test]
    fn test_symbol_seed() {
        assert_eq!(symbol_seed(&["AB".to_string()]), 65 + 66);
    }

    #[test]
    fn test_return_and_vol_from_risk_level() {
        let u = simulated_statistics(&syms(), &[50.0, 20.0, 100.0]).unwrap();
        assert!((u.returns[0] - 0.125).abs() < 1e-12);
        assert!((u.returns[2] - 0.20).abs() < 1e-12);
        assert!((u.covariance[0][0] - 0.15 * 0.15).abs() < 1e-12);
        assert!((u.covariance[1][1] - 0.06 * 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_with_bounded_correlation() {
        let u = simulated_statistics(&syms(), &[50.0, 50.0, 50.0]).unwrap();
        let v = 0.15 * 0.15;
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(u.covariance[i][j], u.covariance[j][i]);
                if i != j {
                    let rho = u.covariance[i][j] / v;
                    assert!((0.3..0.7).contains(&rho), "rho = {}", rho);
                }
            }
        }
    }

    #[test]
    fn test_reproducible() {
        let a = simulated_statistics(&syms(), &[30.0, 40.0, 60.0]).unwrap();
        let b = simulated_statistics(&syms(), &[30.0, 40.0, 60.0]).unwrap();
        assert_eq!(a, b);
    }
}
