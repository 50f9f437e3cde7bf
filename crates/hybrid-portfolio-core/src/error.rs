use thiserror::Error;

/// Failure of a single optimization stage.
///
/// Every variant is recoverable: the caller of a stage matches on the kind
/// and selects the documented fallback instead of propagating it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizationError {
    #[error("Sizing overflow: {required_bits} qubits required, ceiling is {max_bits}")]
    SizingOverflow { required_bits: u32, max_bits: u32 },

    #[error("Heuristic quantum solver is not available in this build")]
    SolverUnavailable,

    #[error("Solver non-convergence: {solver} did not converge after {iterations} iterations")]
    SolverNonconvergence { solver: String, iterations: u32 },

    #[error("Singular covariance matrix cannot be inverted")]
    SingularMatrix,

    #[error("Infeasible problem: {0}")]
    Infeasible(String),

    #[error("Numerical failure: {0}")]
    NumericalFailure(String),
}

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Optimization(#[from] OptimizationError),
}

impl PortfolioError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PortfolioError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PortfolioError {
    fn from(e: serde_json::Error) -> Self {
        PortfolioError::SerializationError(e.to_string())
    }
}
