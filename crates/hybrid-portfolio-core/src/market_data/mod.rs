pub mod history;
pub mod simulated;
