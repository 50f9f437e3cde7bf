mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use std::process;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use commands::allocate::AllocateArgs;
use commands::backtest::BacktestArgs;
use commands::frontier::FrontierArgs;
use commands::optimize::{OptimizeArgs, OptimizeUniverseArgs};
use commands::refine::RefineArgs;
use hybrid_portfolio_core::request::response::ErrorResponse;
use hybrid_portfolio_core::{OptimizerPolicy, SolverCapability};

/// Hybrid quantum-inspired portfolio optimization
#[derive(Parser)]
#[command(
    name = "hpo",
    version,
    about = "Hybrid quantum-inspired portfolio optimization",
    long_about = "Allocates a budget across assets with a simulated QAOA integer allocator, \
                  a mean-variance refiner and a diversification pass. Also samples the \
                  efficient frontier and runs walk-forward backtests."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Optimizer policy overrides (.json, .yaml or .yml)
    #[arg(long, global = true)]
    policy: Option<String>,

    /// Treat the quantum-style solver as unavailable
    #[arg(long, global = true)]
    no_quantum: bool,

    /// Log to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a stock request and report allocation, frontier and backtest
    Optimize(OptimizeArgs),
    /// Optimize a universe of return/covariance statistics
    OptimizeUniverse(OptimizeUniverseArgs),
    /// Integer share allocation over the QUBO relaxation
    Allocate(AllocateArgs),
    /// Classical mean-variance refinement (analytic, bounded or integer)
    Refine(RefineArgs),
    /// Sample the efficient frontier
    Frontier(FrontierArgs),
    /// Walk-forward backtest over a price history
    Backtest(BacktestArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

/// Settings shared by every command.
pub struct Context {
    pub policy: OptimizerPolicy,
    pub capability: SolverCapability,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_context(
    policy_path: Option<&str>,
    no_quantum: bool,
) -> Result<Context, Box<dyn std::error::Error>> {
    let policy = match policy_path {
        Some(path) => {
            let policy: OptimizerPolicy = input::file::read_document(path)?;
            info!(path, "Loaded optimizer policy");
            policy
        }
        None => OptimizerPolicy::default(),
    };
    policy.validate()?;
    let capability = if no_quantum {
        SolverCapability::Unavailable
    } else {
        SolverCapability::detect()
    };
    debug!(?capability, "Solver capability");
    Ok(Context { policy, capability })
}

fn dispatch(command: Commands, ctx: &Context) -> Result<Value, Box<dyn std::error::Error>> {
    match command {
        Commands::Optimize(args) => commands::optimize::run_optimize(args, ctx),
        Commands::OptimizeUniverse(args) => commands::optimize::run_optimize_universe(args, ctx),
        Commands::Allocate(args) => commands::allocate::run_allocate(args, ctx),
        Commands::Refine(args) => commands::refine::run_refine(args, ctx),
        Commands::Frontier(args) => commands::frontier::run_frontier(args, ctx),
        Commands::Backtest(args) => commands::backtest::run_backtest(args, ctx),
        Commands::Version => Ok(Value::String(format!("hpo {}", env!("CARGO_PKG_VERSION")))),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Version => {
            println!("hpo {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        command => load_context(cli.policy.as_deref(), cli.no_quantum)
            .and_then(|ctx| dispatch(command, &ctx)),
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            if let Ok(body) = serde_json::to_value(ErrorResponse::new(e.to_string())) {
                output::json::print_json(&body);
            }
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_policy(name: &str, body: &str) -> String {
        let path = std::env::temp_dir().join(format!("hpo-{}-{}.json", std::process::id(), name));
        fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_default_context() {
        let ctx = load_context(None, true).unwrap();
        assert_eq!(ctx.policy, OptimizerPolicy::default());
        assert_eq!(ctx.capability, SolverCapability::Unavailable);
    }

    #[test]
    fn test_policy_override_loaded() {
        let path = write_policy("override", r#"{"concentration_cap": 0.30}"#);
        let ctx = load_context(Some(&path), false).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(ctx.policy.concentration_cap, 0.30);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let path = write_policy(
            "invalid",
            r#"{"concentration_cap": 0.9, "max_total_bits": 40, "qaoa_shots": 0}"#,
        );
        let result = load_context(Some(&path), false);
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
