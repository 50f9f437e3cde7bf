use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OptimizationError;
use crate::types::{ShareConstraints, Shares};

const CAPACITY_SLACK: f64 = 1e-9;

/// Optimal integer share counts for the budgeted return problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerSolution {
    pub shares: Shares,
    /// `sum returns * shares` at the optimum.
    pub objective: f64,
    /// Cost `sum prices * shares` at the optimum.
    pub invested: f64,
    pub nodes_explored: u64,
}

/// Maximize `sum r_i s_i` subject to `sum p_i s_i <= budget` and
/// `min_i <= s_i <= max_i`, s integer.
///
/// Branch-and-bound over the fractional-knapsack relaxation, explored depth
/// first in descending return-per-price order. Fails with
/// [`OptimizationError::Infeasible`] when the minimum holdings already exceed
/// the budget and with [`OptimizationError::SolverNonconvergence`] when the
/// node cap is hit.
pub fn solve_integer_allocation(
    returns: &[f64],
    constraints: &ShareConstraints,
    max_nodes: u64,
) -> Result<IntegerSolution, OptimizationError> {
    let n = returns.len();
    let prices = &constraints.prices;
    let base_cost: f64 = (0..n)
        .map(|i| prices[i] * constraints.min_shares[i] as f64)
        .sum();
    let capacity = constraints.budget - base_cost;
    if capacity < -CAPACITY_SLACK {
        return Err(OptimizationError::Infeasible(format!(
            "Minimum holdings cost {:.2} exceeds budget {:.2}",
            base_cost, constraints.budget
        )));
    }

    let mut shares = constraints.min_shares.clone();
    let mut items: Vec<Item> = Vec::new();
    for i in 0..n {
        let extra = constraints.max_shares[i] - constraints.min_shares[i];
        if returns[i] <= 0.0 || extra == 0 {
            continue;
        }
        if prices[i] <= 0.0 {
            // free and profitable: always take the maximum
            shares[i] = constraints.max_shares[i];
            continue;
        }
        items.push(Item {
            index: i,
            value: returns[i],
            price: prices[i],
            max_count: extra,
        });
    }
    items.sort_by(|a, b| {
        (b.value / b.price)
            .partial_cmp(&(a.value / a.price))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut search = BranchAndBound {
        items: &items,
        best_value: 0.0,
        best_counts: vec![0; items.len()],
        nodes: 0,
        max_nodes,
    };
    let mut counts = vec![0u32; items.len()];
    search.branch(0, capacity.max(0.0), 0.0, &mut counts)?;
    debug!(nodes = search.nodes, value = search.best_value, "Branch-and-bound finished");

    for (item, count) in items.iter().zip(search.best_counts.iter()) {
        shares[item.index] += count;
    }
    let objective = (0..n).map(|i| returns[i] * shares[i] as f64).sum();
    let invested = (0..n).map(|i| prices[i] * shares[i] as f64).sum();

    Ok(IntegerSolution {
        shares,
        objective,
        invested,
        nodes_explored: search.nodes,
    })
}

#[derive(Debug, Clone, Copy)]
struct Item {
    index: usize,
    value: f64,
    price: f64,
    max_count: u32,
}

struct BranchAndBound<'a> {
    items: &'a [Item],
    best_value: f64,
    best_counts: Vec<u32>,
    nodes: u64,
    max_nodes: u64,
}

impl BranchAndBound<'_> {
    fn branch(
        &mut self,
        k: usize,
        capacity: f64,
        value: f64,
        counts: &mut [u32],
    ) -> Result<(), OptimizationError> {
        self.nodes += 1;
        if self.nodes > self.max_nodes {
            return Err(OptimizationError::SolverNonconvergence {
                solver: "branch_and_bound".into(),
                iterations: self.max_nodes.min(u32::MAX as u64) as u32,
            });
        }

        if k == self.items.len() {
            if value > self.best_value {
                self.best_value = value;
                self.best_counts.copy_from_slice(counts);
            }
            return Ok(());
        }

        if value + self.relaxation_bound(k, capacity) <= self.best_value + 1e-12 {
            return Ok(());
        }

        let item = self.items[k];
        let fit = ((capacity + CAPACITY_SLACK) / item.price).floor();
        let fit = if fit >= item.max_count as f64 {
            item.max_count
        } else {
            fit.max(0.0) as u32
        };

        for c in (0..=fit).rev() {
            counts[k] = c;
            self.branch(
                k + 1,
                capacity - c as f64 * item.price,
                value + c as f64 * item.value,
                counts,
            )?;
        }
        counts[k] = 0;
        Ok(())
    }

    /// Fractional-knapsack value of items `k..` with the remaining capacity.
    fn relaxation_bound(&self, k: usize, mut capacity: f64) -> f64 {
        let mut bound = 0.0;
        for item in &self.items[k..] {
            if capacity <= 0.0 {
                break;
            }
            let take = (capacity / item.price).min(item.max_count as f64);
            bound += take * item.value;
            capacity -= take * item.price;
        }
        bound
    }
}
