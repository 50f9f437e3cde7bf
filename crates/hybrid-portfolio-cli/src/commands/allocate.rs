use clap::Args;
use serde_json::Value;

use hybrid_portfolio_core::quantum::allocator::{self, AllocationInput};

use crate::{input, Context};

#[derive(Args)]
pub struct AllocateArgs {
    /// Universe, risk preference and share constraints (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_allocate(args: AllocateArgs, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    let alloc_input: AllocationInput = input::read_input(args.input.as_deref(), "share allocation")?;
    let result = allocator::run_allocation(&alloc_input, ctx.capability, &ctx.policy)?;
    Ok(serde_json::to_value(result)?)
}
