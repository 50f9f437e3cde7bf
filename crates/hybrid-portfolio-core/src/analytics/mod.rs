pub mod backtest;
pub mod frontier;
pub mod metrics;
