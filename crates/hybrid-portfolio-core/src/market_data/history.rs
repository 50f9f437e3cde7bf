use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet};

use crate::analytics::backtest::MarketDataSource;
use crate::error::PortfolioError;
use crate::types::AssetUniverse;
use crate::PortfolioResult;

/// One daily close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closing prices keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub series: BTreeMap<String, Vec<PricePoint>>,
}

impl PriceHistory {
    pub fn from_json(json: &str) -> PortfolioResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Annualized mean returns and sample covariance of simple daily returns
    /// over dates in `[start, end)` that every symbol quotes.
    pub fn statistics(
        &self,
        symbols: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        annualization_factor: f64,
    ) -> PortfolioResult<AssetUniverse> {
        let in_window = |d: &NaiveDate| start.map_or(true, |s| *d >= s) && end.map_or(true, |e| *d < e);

        let mut closes: Vec<BTreeMap<NaiveDate, f64>> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let series = self.series.get(symbol).ok_or_else(|| {
                PortfolioError::DataUnavailable(format!("No price history for {}", symbol))
            })?;
            closes.push(
                series
                    .iter()
                    .filter(|p| in_window(&p.date))
                    .map(|p| (p.date, p.close))
                    .collect(),
            );
        }

        let mut common: BTreeSet<NaiveDate> = match closes.first() {
            Some(first) => first.keys().copied().collect(),
            None => {
                return Err(PortfolioError::InsufficientData(
                    "At least one symbol required".into(),
                ))
            }
        };
        for c in closes.iter().skip(1) {
            common.retain(|d| c.contains_key(d));
        }
        let dates: Vec<NaiveDate> = common.into_iter().collect();

        let mut returns: Vec<Vec<f64>> = Vec::with_capacity(symbols.len());
        for (symbol, c) in symbols.iter().zip(closes.iter()) {
            let prices: Vec<f64> = dates.iter().filter_map(|d| c.get(d).copied()).collect();
            let mut r = Vec::with_capacity(prices.len().saturating_sub(1));
            for pair in prices.windows(2) {
                if !(pair[0] > 0.0) || !pair[1].is_finite() {
                    return Err(PortfolioError::DataUnavailable(format!(
                        "Non-positive or invalid close in {} history",
                        symbol
                    )));
                }
                r.push(pair[1] / pair[0] - 1.0);
            }
            returns.push(r);
        }

        let observations = returns.first().map_or(0, |r| r.len());
        if observations < 2 {
            return Err(PortfolioError::DataUnavailable(format!(
                "Need at least 2 aligned daily returns, found {}",
                observations
            )));
        }

        let means: Vec<f64> = returns
            .iter()
            .map(|r| r.iter().mean() * annualization_factor)
            .collect();
        let covariance: Vec<Vec<f64>> = returns
            .iter()
            .map(|a| {
                returns
                    .iter()
                    .map(|b| a.iter().covariance(b.iter()) * annualization_factor)
                    .collect()
            })
            .collect();

        AssetUniverse::new(symbols.to_vec(), means, covariance)
    }
}

/// [`PriceHistory`] as a windowed statistics source.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalSource<'a> {
    pub history: &'a PriceHistory,
    pub annualization_factor: f64,
}

impl MarketDataSource for HistoricalSource<'_> {
    fn window_statistics(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortfolioResult<AssetUniverse> {
        self.history
            .statistics(symbols, Some(start), Some(end), self.annualization_factor)
    }
}
