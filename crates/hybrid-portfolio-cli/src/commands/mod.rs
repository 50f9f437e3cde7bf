pub mod allocate;
pub mod backtest;
pub mod frontier;
pub mod optimize;
pub mod refine;

use chrono::{Local, NaiveDate};

/// `YYYY-MM-DD`, or today when absent.
pub(crate) fn parse_as_of(value: Option<&str>) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    match value {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| format!("Invalid --as-of date '{}': {}", s, e).into()),
        None => Ok(Local::now().date_naive()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_as_of() {
        assert_eq!(
            parse_as_of(Some("2024-06-30")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
        );
        assert!(parse_as_of(Some("30/06/2024")).is_err());
    }
}
