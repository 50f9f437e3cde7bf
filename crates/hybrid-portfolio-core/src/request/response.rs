use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analytics::backtest::BacktestRecord;
use crate::analytics::frontier::FrontierPoint;
use crate::analytics::metrics::MetricsSnapshot;

/// Full optimization report. Percentages to 2 dp, Sharpe to 3 dp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResponse {
    /// Symbol -> weight in percent.
    pub allocation: BTreeMap<String, f64>,
    /// Symbol -> whole shares affordable at that weight.
    pub share_allocations: BTreeMap<String, u64>,
    pub expected_return: f64,
    pub expected_risk: f64,
    pub sharpe_ratio: f64,
    pub efficient_frontier: Vec<FrontierPoint>,
    pub current_portfolio: MetricsSnapshot,
    pub optimized_portfolio: MetricsSnapshot,
    pub backtest_results: Vec<BacktestRecord>,
    pub additional_metrics: AdditionalMetrics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMetrics {
    pub optimization_method: String,
    pub number_of_stocks: usize,
    /// Budget after currency conversion.
    pub total_investment: f64,
    pub exchange_rate: Option<f64>,
    /// RFC 3339.
    pub timestamp: String,
}

/// Response emitted when a request cannot be served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub allocation: BTreeMap<String, f64>,
    pub expected_return: f64,
    pub expected_risk: f64,
    pub sharpe_ratio: f64,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorResponse {
            error: message.into(),
            allocation: BTreeMap::new(),
            expected_return: 0.0,
            expected_risk: 0.0,
            sharpe_ratio: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_response_shape() {
        let json = serde_json::to_value(ErrorResponse::new("Invalid input")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error": "Invalid input",
                "allocation": {},
                "expectedReturn": 0.0,
                "expectedRisk": 0.0,
                "sharpeRatio": 0.0
            })
        );
    }
}
