use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::model::OptimizationRequest;
use super::response::{AdditionalMetrics, OptimizationResponse};
use crate::analytics::backtest::run_backtest;
use crate::analytics::frontier::{retain_non_dominated, sample_efficient_frontier};
use crate::analytics::metrics::{round_dp, PortfolioMetrics};
use crate::error::PortfolioError;
use crate::hybrid::orchestrator::{optimize_portfolio, OptimizationMethod};
use crate::market_data::history::{HistoricalSource, PriceHistory};
use crate::market_data::simulated::simulated_statistics;
use crate::policy::{OptimizerPolicy, SolverCapability};
use crate::types::{equal_weights, AssetUniverse, RiskPreference, ShareConstraints};
use crate::PortfolioResult;

/// Walk-forward settings for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub periods: Vec<String>,
    pub as_of: NaiveDate,
}

/// Caller-side settings for one request.
#[derive(Debug, Clone)]
pub struct PipelineOptions<'a> {
    /// Overrides the request's own `method` when set.
    pub method: Option<OptimizationMethod>,
    pub capability: SolverCapability,
    /// Multiplies prices, invested amounts and the budget.
    pub exchange_rate: Option<f64>,
    pub history: Option<&'a PriceHistory>,
    pub backtest: Option<BacktestSettings>,
    pub timestamp: DateTime<Utc>,
}

/// Serve an optimization request end to end.
///
/// Only invalid input is returned as an error; every optimization stage
/// degrades to its fallback instead.
pub fn optimize_request(
    request: &OptimizationRequest,
    options: &PipelineOptions<'_>,
    policy: &OptimizerPolicy,
) -> PortfolioResult<OptimizationResponse> {
    request.validate()?;
    let mut warnings = Vec::new();

    let method = match options.method {
        Some(m) => m,
        None => match &request.method {
            Some(s) => s.parse()?,
            None => OptimizationMethod::default(),
        },
    };
    let rate = match options.exchange_rate {
        Some(r) if r.is_finite() && r > 0.0 => r,
        Some(r) => {
            return Err(PortfolioError::invalid(
                "exchange_rate",
                format!("Exchange rate must be positive, got {}", r),
            ))
        }
        None => 1.0,
    };

    // Weight constraints are validated above but do not steer the optimizer
    for symbol in request.unknown_constraint_symbols() {
        warnings.push(format!("Constraint for unknown symbol {} ignored", symbol));
    }

    let symbols = request.symbols();
    let n = symbols.len();
    let prices: Vec<f64> = request
        .stocks
        .iter()
        .map(|s| s.current_price.map_or(policy.default_price, |p| p * rate))
        .collect();
    let budget = request.total_investment() * rate;

    let universe = load_statistics(request, options.history, policy, &mut warnings)?;
    let risk = RiskPreference::from_risk_level(request.target_risk_level());
    let share_constraints = ShareConstraints::uniform(prices.clone(), budget, policy.default_max_shares);

    info!(%method, n, budget, "Optimizing request");
    let optimization = optimize_portfolio(
        method,
        &universe,
        risk,
        Some(&share_constraints),
        options.capability,
        policy,
    )?;
    warnings.extend(optimization.warnings.iter().cloned());
    let weights = &optimization.weights;

    // Allocation and share counts
    let holdings: Vec<f64> = current_holdings(request, &prices, rate);
    let current_value = {
        let total: f64 = holdings.iter().sum();
        if total > 0.0 {
            total
        } else {
            budget
        }
    };
    let weight_total: f64 = weights.iter().sum();
    let mut allocation = BTreeMap::new();
    let mut share_allocations = BTreeMap::new();
    for (i, symbol) in symbols.iter().enumerate() {
        let w = if weight_total > 0.0 {
            weights[i] / weight_total
        } else {
            1.0 / n as f64
        };
        allocation.insert(symbol.clone(), to_percent(w));
        share_allocations.insert(symbol.clone(), affordable_shares(w, current_value, prices[i]));
    }

    // Metrics
    let optimized = optimization.metrics.snapshot();
    let current_weights = {
        let total: f64 = holdings.iter().sum();
        if total > 0.0 {
            holdings.iter().map(|h| h / total).collect()
        } else {
            equal_weights(n)
        }
    };
    let current = PortfolioMetrics::evaluate(&current_weights, &universe, policy.risk_free_rate).snapshot();

    let efficient_frontier = retain_non_dominated(
        sample_efficient_frontier(
            &universe,
            policy.frontier_samples,
            policy.frontier_seed,
            policy.risk_free_rate,
        )
        .into_iter()
        .map(|p| p.to_percent())
        .collect(),
    );

    let backtest_results = match (&options.backtest, options.history) {
        (Some(settings), Some(history)) => {
            let source = HistoricalSource {
                history,
                annualization_factor: policy.annualization_factor,
            };
            let report = run_backtest(&symbols, &settings.periods, settings.as_of, &source, policy);
            warnings.extend(
                report
                    .skipped_periods
                    .iter()
                    .map(|p| format!("Backtest period {} skipped", p)),
            );
            report.records
        }
        (Some(_), None) => {
            warn!("Backtest requested without price history");
            warnings.push("Backtest skipped: no price history supplied".to_string());
            Vec::new()
        }
        _ => Vec::new(),
    };

    Ok(OptimizationResponse {
        allocation,
        share_allocations,
        expected_return: optimized.ret,
        expected_risk: optimized.risk,
        sharpe_ratio: optimized.sharpe,
        efficient_frontier,
        current_portfolio: current,
        optimized_portfolio: optimized,
        backtest_results,
        additional_metrics: AdditionalMetrics {
            optimization_method: method.label().to_string(),
            number_of_stocks: n,
            total_investment: round_dp(budget, 2),
            exchange_rate: options.exchange_rate,
            timestamp: options.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        },
        warnings,
    })
}

/// Historical statistics when requested and available, simulated otherwise.
fn load_statistics(
    request: &OptimizationRequest,
    history: Option<&PriceHistory>,
    policy: &OptimizerPolicy,
    warnings: &mut Vec<String>,
) -> PortfolioResult<AssetUniverse> {
    let symbols = request.symbols();
    if request.use_real_data.unwrap_or(true) {
        if let Some(h) = history {
            match h.statistics(&symbols, None, None, policy.annualization_factor) {
                Ok(u) => return Ok(u),
                Err(err) => {
                    warn!(error = %err, "Historical statistics unavailable; simulating");
                    warnings.push(format!("Simulated statistics used: {}", err));
                }
            }
        }
    }
    simulated_statistics(&symbols, &request.risk_levels())
}

/// Current value held per stock: `quantity * price` when every stock quotes a
/// quantity, otherwise the invested amounts.
fn current_holdings(request: &OptimizationRequest, prices: &[f64], rate: f64) -> Vec<f64> {
    if request.stocks.iter().all(|s| s.quantity.is_some()) {
        request
            .stocks
            .iter()
            .zip(prices.iter())
            .map(|(s, p)| s.quantity.unwrap_or(0.0) * p)
            .collect()
    } else {
        request
            .stocks
            .iter()
            .map(|s| s.investment_amount.unwrap_or(0.0) * rate)
            .collect()
    }
}

fn to_percent(weight: f64) -> f64 {
    Decimal::from_f64(weight)
        .map(|w| (w * dec!(100)).round_dp(2))
        .and_then(|p| p.to_f64())
        .unwrap_or(0.0)
}

/// `floor(weight * value / price)`; zero for a non-positive price.
fn affordable_shares(weight: f64, value: f64, price: f64) -> u64 {
    let (Some(w), Some(v), Some(p)) = (
        Decimal::from_f64(weight),
        Decimal::from_f64(value),
        Decimal::from_f64(price),
    ) else {
        return 0;
    };
    if p <= Decimal::ZERO {
        return 0;
    }
    (w * v / p).floor().to_u64().unwrap_or(0)
}
