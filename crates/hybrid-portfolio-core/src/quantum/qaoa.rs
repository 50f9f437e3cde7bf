use argmin::core::{CostFunction, Executor};
use argmin::solver::neldermead::NelderMead;
use num_complex::Complex64;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use super::encoding::Qubo;
use crate::error::OptimizationError;
use crate::policy::OptimizerPolicy;

const INITIAL_ANGLE: f64 = 0.5;
const SIMPLEX_STEP: f64 = 0.25;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Shallow QAOA run on a classical state-vector simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QaoaSolver {
    /// Number of cost/mixer layers.
    pub reps: usize,
    /// Nelder-Mead iteration cap for the angle search.
    pub max_iterations: u64,
    pub shots: usize,
    pub seed: u64,
}

/// Best measured bitstring of a QAOA run.
#[derive(Debug, Clone, PartialEq)]
pub struct QaoaSolution {
    /// Bit `u` is binary variable `u`.
    pub state: usize,
    pub energy: f64,
    /// `[gamma_1..gamma_p, beta_1..beta_p]`.
    pub angles: Vec<f64>,
    /// Energy expectation at `angles`.
    pub expectation: f64,
}

impl QaoaSolver {
    pub fn from_policy(policy: &OptimizerPolicy) -> Self {
        QaoaSolver {
            reps: policy.qaoa_reps.max(1),
            max_iterations: policy.qaoa_max_iterations,
            shots: policy.qaoa_shots.max(1),
            seed: policy.qaoa_seed,
        }
    }

    /// Minimize the QUBO heuristically.
    ///
    /// Angles are tuned against the exact energy expectation, then the
    /// final state is sampled `shots` times and the cheapest sample kept.
    pub fn solve(&self, qubo: &Qubo) -> Result<QaoaSolution, OptimizationError> {
        let num_qubits = qubo.num_vars();
        let landscape = qubo.energy_landscape();

        if num_qubits == 0 {
            return Ok(QaoaSolution {
                state: 0,
                energy: landscape[0],
                angles: Vec::new(),
                expectation: landscape[0],
            });
        }

        let x0 = vec![INITIAL_ANGLE; 2 * self.reps];
        let mut simplex = vec![x0.clone()];
        for k in 0..x0.len() {
            let mut vertex = x0.clone();
            vertex[k] += SIMPLEX_STEP;
            simplex.push(vertex);
        }

        let cost = ExpectationCost {
            landscape: &landscape,
            num_qubits,
            reps: self.reps,
        };
        let solver = NelderMead::new(simplex)
            .with_sd_tolerance(1e-8)
            .map_err(|e| OptimizationError::NumericalFailure(e.to_string()))?;
        let res = Executor::new(cost, solver)
            .configure(|state| state.max_iters(self.max_iterations))
            .run()
            .map_err(|e| OptimizationError::NumericalFailure(e.to_string()))?;
        let angles = res.state.best_param.unwrap_or(x0);

        let amplitudes = simulate(&landscape, num_qubits, self.reps, &angles);
        let probabilities: Vec<f64> = amplitudes.iter().map(|a| a.norm_sqr()).collect();
        let expectation = expectation_value(&probabilities, &landscape);
        debug!(?angles, expectation, "QAOA angle search finished");

        let dist = WeightedIndex::new(&probabilities)
            .map_err(|e| OptimizationError::NumericalFailure(e.to_string()))?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(usize, f64)> = None;
        for _ in 0..self.shots {
            let state = dist.sample(&mut rng);
            let energy = landscape[state];
            if best.map_or(true, |(_, e)| energy < e) {
                best = Some((state, energy));
            }
        }
        let (state, energy) = best.ok_or_else(|| {
            OptimizationError::NumericalFailure("QAOA produced no measurements".into())
        })?;

        debug!(state, energy, "QAOA best measured bitstring");
        Ok(QaoaSolution {
            state,
            energy,
            angles,
            expectation,
        })
    }
}

// ---------------------------------------------------------------------------
// Angle search objective
// ---------------------------------------------------------------------------

struct ExpectationCost<'a> {
    landscape: &'a [f64],
    num_qubits: usize,
    reps: usize,
}

impl CostFunction for ExpectationCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, angles: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let amplitudes = simulate(self.landscape, self.num_qubits, self.reps, angles);
        let probabilities: Vec<f64> = amplitudes.iter().map(|a| a.norm_sqr()).collect();
        Ok(expectation_value(&probabilities, self.landscape))
    }
}

fn expectation_value(probabilities: &[f64], landscape: &[f64]) -> f64 {
    probabilities
        .iter()
        .zip(landscape.iter())
        .map(|(p, e)| p * e)
        .sum()
}

// ---------------------------------------------------------------------------
// State-vector simulation
// ---------------------------------------------------------------------------

/// Final state of `reps` alternating cost/mixer layers applied to `|+>^n`.
fn simulate(landscape: &[f64], num_qubits: usize, reps: usize, angles: &[f64]) -> Vec<Complex64> {
    let dim = 1usize << num_qubits;
    let amp0 = 1.0 / (dim as f64).sqrt();
    let mut state = vec![Complex64::new(amp0, 0.0); dim];

    for layer in 0..reps {
        let gamma = angles[layer];
        let beta = angles[reps + layer];
        apply_cost_layer(&mut state, landscape, gamma);
        apply_mixer_layer(&mut state, num_qubits, beta);
    }
    state
}

/// Diagonal phase `exp(-i * gamma * C(z))`.
fn apply_cost_layer(state: &mut [Complex64], landscape: &[f64], gamma: f64) {
    for (amp, energy) in state.iter_mut().zip(landscape.iter()) {
        *amp *= Complex64::from_polar(1.0, -gamma * energy);
    }
}

/// `exp(-i * beta * X)` on every qubit.
fn apply_mixer_layer(state: &mut [Complex64], num_qubits: usize, beta: f64) {
    let c = Complex64::new(beta.cos(), 0.0);
    let s = Complex64::new(0.0, -beta.sin());
    for q in 0..num_qubits {
        let mask = 1usize << q;
        for idx in 0..state.len() {
            if idx & mask != 0 {
                continue;
            }
            let a0 = state[idx];
            let a1 = state[idx | mask];
            state[idx] = c * a0 + s * a1;
            state[idx | mask] = s * a0 + c * a1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::encoding::ShareEncoding;
    use crate::types::{AssetUniverse, RiskPreference, ShareConstraints};

    fn norm(state: &[Complex64]) -> f64 {
        state.iter().map(|a| a.norm_sqr()).sum()
    }

    #[test]
    fn test_simulation_preserves_norm() {
        let landscape = vec![0.3, -1.2, 0.7, 2.0, -0.4, 0.0, 1.1, -2.5];
        let state = simulate(&landscape, 3, 2, &[0.4, 1.3, 0.9, 0.2]);
        assert!((norm(&state) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_angles_keep_uniform_superposition() {
        let landscape = vec![1.0, 2.0, 3.0, 4.0];
        let state = simulate(&landscape, 2, 1, &[0.0, 0.0]);
        for amp in &state {
            assert!((amp.norm_sqr() - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_full_mixer_rotation_flips_basis_state() {
        // beta = pi/2 maps |0> to -i|1> on a single qubit
        let mut state = vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)];
        apply_mixer_layer(&mut state, 1, std::f64::consts::FRAC_PI_2);
        assert!(state[0].norm_sqr() < 1e-12);
        assert!((state[1].norm_sqr() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_assets_prefer_max_shares() {
        let universe = AssetUniverse::new(
            vec!["A".into(), "B".into()],
            vec![0.5, 0.4],
            vec![vec![0.001, 0.0], vec![0.0, 0.001]],
        )
        .unwrap();
        let policy = OptimizerPolicy::default();
        let enc =
            ShareEncoding::build(&ShareConstraints::uniform(vec![100.0; 2], 10_000.0, 3), &policy)
                .unwrap();
        let qubo = enc.to_qubo(&universe, RiskPreference(0.5));
        let sol = QaoaSolver::from_policy(&policy).solve(&qubo).unwrap();
        assert_eq!(enc.decode(sol.state), vec![3, 3]);
        assert!((sol.energy - qubo.evaluate(sol.state)).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let landscape_qubo = Qubo {
            offset: 0.0,
            linear: vec![0.2, -0.3, 0.1],
            quadratic: vec![
                vec![0.0, 0.5, -0.2],
                vec![0.0, 0.0, 0.4],
                vec![0.0, 0.0, 0.0],
            ],
        };
        let solver = QaoaSolver::from_policy(&OptimizerPolicy::default());
        let a = solver.solve(&landscape_qubo).unwrap();
        let b = solver.solve(&landscape_qubo).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_variables_returns_offset() {
        let qubo = Qubo {
            offset: -1.5,
            linear: Vec::new(),
            quadratic: Vec::new(),
        };
        let sol = QaoaSolver::from_policy(&OptimizerPolicy::default())
            .solve(&qubo)
            .unwrap();
        assert_eq!(sol.state, 0);
        assert_eq!(sol.energy, -1.5);
    }
}
