use clap::Args;
use serde_json::Value;

use hybrid_portfolio_core::analytics::backtest::{run_backtest_report, BacktestInput};
use hybrid_portfolio_core::market_data::history::{HistoricalSource, PriceHistory};

use super::parse_as_of;
use crate::{input, Context};

#[derive(Args)]
pub struct BacktestArgs {
    /// Daily price history (JSON or YAML)
    #[arg(long)]
    pub prices: String,

    /// Symbols to include, comma separated; default every symbol in the history
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Look-back periods, comma separated
    #[arg(long, value_delimiter = ',', default_value = "1mo,3mo,6mo,1y")]
    pub periods: Vec<String>,

    /// Evaluation date (YYYY-MM-DD), default today
    #[arg(long)]
    pub as_of: Option<String>,
}

pub fn run_backtest(args: BacktestArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let history: PriceHistory = input::file::read_document(&args.prices)?;
    let symbols = if args.symbols.is_empty() {
        history.series.keys().cloned().collect()
    } else {
        args.symbols
    };
    let bt_input = BacktestInput {
        symbols,
        periods: args.periods,
        as_of: parse_as_of(args.as_of.as_deref())?,
    };
    let source = HistoricalSource {
        history: &history,
        annualization_factor: ctx.policy.annualization_factor,
    };
    let result = run_backtest_report(&bt_input, &source, &ctx.policy)?;
    Ok(serde_json::to_value(result)?)
}
