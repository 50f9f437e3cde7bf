use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use super::metrics::{round_dp, MetricsSnapshot, PortfolioMetrics};
use crate::classical::mean_variance::analytic_or_uniform;
use crate::error::PortfolioError;
use crate::policy::OptimizerPolicy;
use crate::types::{equal_weights, with_metadata, AssetUniverse, ComputationOutput, RiskPreference};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Data source
// ---------------------------------------------------------------------------

/// Supplier of annualized statistics for a date window.
pub trait MarketDataSource {
    /// Statistics for `symbols` (in that order) over `[start, end)`.
    fn window_statistics(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortfolioResult<AssetUniverse>;
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Look-back horizon such as `3mo` or `1y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookbackPeriod {
    Months(u32),
    Years(u32),
}

impl LookbackPeriod {
    pub fn parse(s: &str) -> PortfolioResult<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (digits, ctor): (&str, fn(u32) -> LookbackPeriod) = if let Some(d) = s.strip_suffix("mo") {
            (d, LookbackPeriod::Months)
        } else if let Some(d) = s.strip_suffix('y') {
            (d, LookbackPeriod::Years)
        } else {
            return Err(PortfolioError::invalid(
                "period",
                format!("Unrecognized period '{}' (expected <N>mo or <N>y)", s),
            ));
        };
        let count: u32 = digits.parse().map_err(|_| {
            PortfolioError::invalid("period", format!("Invalid period length in '{}'", s))
        })?;
        if count == 0 {
            return Err(PortfolioError::invalid("period", "Period length must be positive"));
        }
        Ok(ctor(count))
    }

    pub fn months(self) -> u32 {
        match self {
            LookbackPeriod::Months(m) => m,
            LookbackPeriod::Years(y) => y.saturating_mul(12),
        }
    }

    /// `date` moved back by this period.
    pub fn before(self, date: NaiveDate) -> PortfolioResult<NaiveDate> {
        date.checked_sub_months(Months::new(self.months()))
            .ok_or_else(|| PortfolioError::DateError(format!("{:?} before {} is out of range", self, date)))
    }
}

/// Walk-forward result for one look-back period. Metrics are in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRecord {
    pub period: String,
    pub lookback_date: NaiveDate,
    /// Optimal weights scored on the training window.
    pub predicted: MetricsSnapshot,
    /// Optimal weights scored on the forward window.
    pub actual: MetricsSnapshot,
    /// Equal weights scored on the forward window.
    pub baseline: MetricsSnapshot,
    /// `actual.return - baseline.return`, percentage points.
    pub outperformance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestInput {
    pub symbols: Vec<String>,
    pub periods: Vec<String>,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub records: Vec<BacktestRecord>,
    pub skipped_periods: Vec<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Evaluate the analytic optimizer walk-forward for each period.
///
/// A period whose string, dates or data fail is logged, reported in
/// `skipped_periods` and left out; the others still run.
pub fn run_backtest(
    symbols: &[String],
    periods: &[String],
    as_of: NaiveDate,
    source: &dyn MarketDataSource,
    policy: &OptimizerPolicy,
) -> BacktestReport {
    let mut records = Vec::new();
    let mut skipped_periods = Vec::new();
    for period in periods {
        match backtest_period(symbols, period, as_of, source, policy) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(period = %period, error = %err, "Skipping backtest period");
                skipped_periods.push(period.clone());
            }
        }
    }
    info!(completed = records.len(), skipped = skipped_periods.len(), "Backtest finished");
    BacktestReport {
        records,
        skipped_periods,
    }
}

fn backtest_period(
    symbols: &[String],
    period: &str,
    as_of: NaiveDate,
    source: &dyn MarketDataSource,
    policy: &OptimizerPolicy,
) -> PortfolioResult<BacktestRecord> {
    let lookback = LookbackPeriod::parse(period)?;
    let lookback_date = lookback.before(as_of)?;
    let training_start = LookbackPeriod::Years(policy.training_window_years.max(1)).before(lookback_date)?;

    let training = source.window_statistics(symbols, training_start, lookback_date)?;
    let optimal = analytic_or_uniform(&training, RiskPreference(policy.backtest_risk_factor));
    let forward = source.window_statistics(symbols, lookback_date, as_of)?;
    let baseline_weights = equal_weights(forward.len());

    let rf = policy.risk_free_rate;
    let predicted = PortfolioMetrics::evaluate(&optimal, &training, rf).snapshot();
    let actual = PortfolioMetrics::evaluate(&optimal, &forward, rf).snapshot();
    let baseline = PortfolioMetrics::evaluate(&baseline_weights, &forward, rf).snapshot();

    Ok(BacktestRecord {
        period: period.to_string(),
        lookback_date,
        predicted,
        actual,
        baseline,
        outperformance: round_dp(actual.ret - baseline.ret, 2),
    })
}

/// Backtest wrapped in the computation envelope.
pub fn run_backtest_report(
    input: &BacktestInput,
    source: &dyn MarketDataSource,
    policy: &OptimizerPolicy,
) -> PortfolioResult<ComputationOutput<BacktestReport>> {
    let start = Instant::now();
    if input.symbols.is_empty() {
        return Err(PortfolioError::InsufficientData(
            "At least one symbol required".into(),
        ));
    }
    let report = run_backtest(&input.symbols, &input.periods, input.as_of, source, policy);
    let warnings = report
        .skipped_periods
        .iter()
        .map(|p| format!("Period {} skipped: data or computation unavailable", p))
        .collect();
    let assumptions = serde_json::json!({
        "as_of": input.as_of,
        "risk_factor": policy.backtest_risk_factor,
        "training_window_years": policy.training_window_years,
        "baseline": "equal_weight",
        "risk_free_rate": policy.risk_free_rate,
    });
    Ok(with_metadata(
        "Walk-forward backtest of analytic mean-variance weights vs equal weight",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        report,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
