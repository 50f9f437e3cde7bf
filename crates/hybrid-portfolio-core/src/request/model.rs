use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::PortfolioError;
use crate::types::WeightConstraints;
use crate::PortfolioResult;

pub const DEFAULT_TOTAL_INVESTMENT: f64 = 10_000.0;
pub const DEFAULT_TARGET_RISK: f64 = 5.0;
pub const DEFAULT_STOCK_RISK: f64 = 5.0;

/// One holding in an optimization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRequest {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    /// Shares currently held.
    #[serde(default)]
    pub quantity: Option<f64>,
    /// Amount currently invested, used when `quantity` is absent.
    #[serde(default)]
    pub investment_amount: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<f64>,
}

/// Per-symbol fractional weight bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBound {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max_weight")]
    pub max: f64,
}

fn default_max_weight() -> f64 {
    1.0
}

/// Portfolio optimization request as produced by the data loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub stocks: Vec<StockRequest>,
    #[serde(default)]
    pub total_investment: Option<f64>,
    /// Risk appetite on a 0-10 scale.
    #[serde(default)]
    pub target_risk_level: Option<f64>,
    #[serde(default)]
    pub constraints: Option<BTreeMap<String, WeightBound>>,
    #[serde(default)]
    pub use_real_data: Option<bool>,
    /// `QAOA`, `MPT` or `HYBRID`; overridden by the caller when given there.
    #[serde(default)]
    pub method: Option<String>,
}

impl OptimizationRequest {
    pub fn total_investment(&self) -> f64 {
        self.total_investment.unwrap_or(DEFAULT_TOTAL_INVESTMENT)
    }

    pub fn target_risk_level(&self) -> f64 {
        self.target_risk_level.unwrap_or(DEFAULT_TARGET_RISK)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.stocks.iter().map(|s| s.symbol.clone()).collect()
    }

    pub fn risk_levels(&self) -> Vec<f64> {
        self.stocks
            .iter()
            .map(|s| s.risk_level.unwrap_or(DEFAULT_STOCK_RISK))
            .collect()
    }

    pub fn validate(&self) -> PortfolioResult<()> {
        if self.stocks.is_empty() {
            return Err(PortfolioError::invalid("stocks", "At least one stock required"));
        }
        let mut seen = HashSet::new();
        for (i, stock) in self.stocks.iter().enumerate() {
            let symbol = stock.symbol.trim();
            if symbol.is_empty() {
                return Err(PortfolioError::invalid(
                    format!("stocks[{}].symbol", i),
                    "Symbol is required",
                ));
            }
            if !seen.insert(symbol.to_string()) {
                return Err(PortfolioError::invalid(
                    format!("stocks[{}].symbol", i),
                    format!("Duplicate symbol {}", symbol),
                ));
            }
            for (field, value) in [
                ("currentPrice", stock.current_price),
                ("quantity", stock.quantity),
                ("investmentAmount", stock.investment_amount),
                ("riskLevel", stock.risk_level),
            ] {
                if let Some(v) = value {
                    if !v.is_finite() || v < 0.0 {
                        return Err(PortfolioError::invalid(
                            format!("stocks[{}].{}", i, field),
                            "Must be a finite, non-negative number",
                        ));
                    }
                }
            }
        }

        let risk = self.target_risk_level();
        if !(0.0..=10.0).contains(&risk) {
            return Err(PortfolioError::invalid(
                "targetRiskLevel",
                "Target risk level must be between 0 and 10",
            ));
        }
        let budget = self.total_investment();
        if !budget.is_finite() || budget < 0.0 {
            return Err(PortfolioError::invalid(
                "totalInvestment",
                "Total investment must be a finite, non-negative amount",
            ));
        }
        if let Some(bounds) = self.weight_constraints() {
            bounds.validate(self.stocks.len())?;
        }
        Ok(())
    }

    /// Weight bounds in stock order; symbols without an entry get `[0, 1]`.
    pub fn weight_constraints(&self) -> Option<WeightConstraints> {
        let map = self.constraints.as_ref()?;
        let (min_weights, max_weights) = self
            .stocks
            .iter()
            .map(|s| {
                map.get(&s.symbol)
                    .map_or((0.0, 1.0), |b| (b.min, b.max))
            })
            .unzip();
        Some(WeightConstraints {
            min_weights,
            max_weights,
        })
    }

    /// Constraint keys that match no requested stock.
    pub fn unknown_constraint_symbols(&self) -> Vec<String> {
        let Some(map) = &self.constraints else {
            return Vec::new();
        };
        map.keys()
            .filter(|k| !self.stocks.iter().any(|s| &s.symbol == *k))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(json: &str) -> OptimizationRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let r = request(r#"{"stocks": [{"symbol": "AAPL"}]}"#);
        assert_eq!(r.total_investment(), 10_000.0);
        assert_eq!(r.target_risk_level(), 5.0);
        assert_eq!(r.risk_levels(), vec![5.0]);
        assert!(r.weight_constraints().is_none());
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_camel_case_fields() {
        let r = request(
            r#"{
                "stocks": [{"symbol": "AAPL", "name": "Apple", "currentPrice": 190.5,
                            "quantity": 3, "riskLevel": 40}],
                "totalInvestment": 5000,
                "targetRiskLevel": 7,
                "useRealData": false
            }"#,
        );
        assert_eq!(r.stocks[0].current_price, Some(190.5));
        assert_eq!(r.stocks[0].quantity, Some(3.0));
        assert_eq!(r.total_investment(), 5000.0);
        assert_eq!(r.use_real_data, Some(false));
    }

    #[test]
    fn test_constraints_in_stock_order() {
        let r = request(
            r#"{
                "stocks": [{"symbol": "A"}, {"symbol": "B"}, {"symbol": "C"}],
                "constraints": {"C": {"max": 0.4}, "A": {"min": 0.1, "max": 0.5}}
            }"#,
        );
        let c = r.weight_constraints().unwrap();
        assert_eq!(c.min_weights, vec![0.1, 0.0, 0.0]);
        assert_eq!(c.max_weights, vec![0.5, 1.0, 0.4]);
    }

    #[test]
    fn test_validation_errors() {
        let empty = request(r#"{"stocks": []}"#);
        assert!(empty.validate().is_err());

        let blank = request(r#"{"stocks": [{"symbol": " "}]}"#);
        assert!(blank.validate().is_err());

        let dup = request(r#"{"stocks": [{"symbol": "A"}, {"symbol": "A"}]}"#);
        assert!(dup.validate().is_err());

        let risk = request(r#"{"stocks": [{"symbol": "A"}], "targetRiskLevel": 11}"#);
        assert!(risk.validate().is_err());

        let bounds = request(r#"{"stocks": [{"symbol": "A"}], "constraints": {"A": {"min": 0.6, "max": 0.2}}}"#);
        assert!(bounds.validate().is_err());
    }

    #[test]
    fn test_unknown_constraint_symbols() {
        let r = request(r#"{"stocks": [{"symbol": "A"}], "constraints": {"Z": {"max": 0.5}}}"#);
        assert_eq!(r.unknown_constraint_symbols(), vec!["Z".to_string()]);
    }

    #[test]
    fn test_missing_symbol_field_is_parse_error() {
        let parsed: Result<OptimizationRequest, _> = serde_json::from_str(r#"{"stocks": [{"name": "x"}]}"#);
        assert!(parsed.is_err());
    }
}
