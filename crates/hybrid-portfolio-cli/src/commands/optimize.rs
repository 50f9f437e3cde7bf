use chrono::Utc;
use clap::Args;
use serde_json::Value;

use hybrid_portfolio_core::hybrid::orchestrator::{run_optimization, OptimizationInput, OptimizationMethod};
use hybrid_portfolio_core::market_data::history::PriceHistory;
use hybrid_portfolio_core::request::model::OptimizationRequest;
use hybrid_portfolio_core::request::pipeline::{optimize_request, BacktestSettings, PipelineOptions};

use super::parse_as_of;
use crate::{input, Context};

#[derive(Args)]
pub struct OptimizeArgs {
    /// Optimization request (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,

    /// QAOA, MPT or HYBRID; overrides the request's method
    #[arg(long)]
    pub method: Option<OptimizationMethod>,

    /// Daily price history used for statistics and backtests
    #[arg(long)]
    pub prices: Option<String>,

    /// Backtest look-back periods, e.g. 1mo,3mo,1y
    #[arg(long, value_delimiter = ',')]
    pub backtest: Vec<String>,

    /// Backtest evaluation date (YYYY-MM-DD), default today
    #[arg(long)]
    pub as_of: Option<String>,

    /// Currency conversion applied to prices, amounts and the budget
    #[arg(long)]
    pub exchange_rate: Option<f64>,
}

#[derive(Args)]
pub struct OptimizeUniverseArgs {
    /// Universe statistics, risk preference and constraints (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_optimize(args: OptimizeArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let request: OptimizationRequest = input::read_input(args.input.as_deref(), "optimize")?;
    let history: Option<PriceHistory> = match &args.prices {
        Some(path) => Some(input::file::read_document(path)?),
        None => None,
    };
    let backtest = if args.backtest.is_empty() {
        None
    } else {
        Some(BacktestSettings {
            periods: args.backtest,
            as_of: parse_as_of(args.as_of.as_deref())?,
        })
    };
    let options = PipelineOptions {
        method: args.method,
        capability: ctx.capability,
        exchange_rate: args.exchange_rate,
        history: history.as_ref(),
        backtest,
        timestamp: Utc::now(),
    };
    let response = optimize_request(&request, &options, &ctx.policy)?;
    Ok(serde_json::to_value(response)?)
}

pub fn run_optimize_universe(
    args: OptimizeUniverseArgs,
    ctx: &Context,
) -> Result<Value, Box<dyn std::error::Error>> {
    let opt_input: OptimizationInput = input::read_input(args.input.as_deref(), "optimize-universe")?;
    let result = run_optimization(&opt_input, ctx.capability, &ctx.policy)?;
    Ok(serde_json::to_value(result)?)
}
