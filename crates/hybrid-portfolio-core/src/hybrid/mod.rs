pub mod diversification;
pub mod orchestrator;
