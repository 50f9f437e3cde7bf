pub mod error;
pub mod policy;
pub mod types;

pub mod analytics;
pub mod classical;
pub mod hybrid;
pub mod market_data;
pub mod quantum;
pub mod request;

pub use error::{OptimizationError, PortfolioError};
pub use policy::{OptimizerPolicy, RefinementObjective, SolverCapability};
pub use types::*;

/// Standard result type for all portfolio operations
pub type PortfolioResult<T> = Result<T, PortfolioError>;
