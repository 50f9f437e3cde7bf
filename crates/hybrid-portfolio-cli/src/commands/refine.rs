use clap::Args;
use serde_json::Value;

use hybrid_portfolio_core::classical::refiner::{self, RefinementInput};

use crate::{input, Context};

#[derive(Args)]
pub struct RefineArgs {
    /// Universe, risk preference and refiner constraints (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_refine(args: RefineArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let refine_input: RefinementInput = input::read_input(args.input.as_deref(), "refinement")?;
    let result = refiner::run_refinement(&refine_input, &ctx.policy)?;
    Ok(serde_json::to_value(result)?)
}
