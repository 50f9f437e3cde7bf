use clap::Args;
use serde_json::Value;

use hybrid_portfolio_core::analytics::frontier::{self, FrontierInput};

use crate::{input, Context};

#[derive(Args)]
pub struct FrontierArgs {
    /// Universe statistics (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,

    /// Number of random portfolios to draw
    #[arg(long)]
    pub samples: Option<usize>,

    /// Sampling seed
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_frontier(args: FrontierArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let mut frontier_input: FrontierInput =
        input::read_input(args.input.as_deref(), "efficient frontier")?;
    if args.samples.is_some() {
        frontier_input.num_portfolios = args.samples;
    }
    if args.seed.is_some() {
        frontier_input.seed = args.seed;
    }
    let result = frontier::run_frontier(&frontier_input, &ctx.policy)?;
    Ok(serde_json::to_value(result)?)
}
