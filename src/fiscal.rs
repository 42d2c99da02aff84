//! Financial year resolution (April to March)
use chrono::Datelike;
use std::{fmt, str::FromStr};

/// A financial year running from 1 April of `start` to 31 March of `start + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiscalYear {
    start: i32,
}

impl FiscalYear {
    pub fn new(start: i32) -> Self {
        Self { start }
    }
    /// Resolves the financial year a calendar date falls in.
    pub fn containing<D: Datelike>(date: &D) -> Self {
        if date.month() >= 4 {
            Self::new(date.year())
        } else {
            Self::new(date.year() - 1)
        }
    }
    pub fn start_year(&self) -> i32 {
        self.start
    }
    pub fn end_year(&self) -> i32 {
        self.start + 1
    }
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.start, self.end_year().rem_euclid(100))
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FiscalYearParseError {
    #[error("expected YYYY-YY")]
    Shape,
    #[error("end year does not follow start year")]
    Discontinuous,
}

impl FromStr for FiscalYear {
    type Err = FiscalYearParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s.split_once('-').ok_or(FiscalYearParseError::Shape)?;
        let digits = |t: &str, len| t.len() == len && t.bytes().all(|b| b.is_ascii_digit());
        if !digits(start, 4) || !digits(end, 2) {
            return Err(FiscalYearParseError::Shape);
        }
        let start: i32 = start.parse().map_err(|_| FiscalYearParseError::Shape)?;
        let end: i32 = end.parse().map_err(|_| FiscalYearParseError::Shape)?;

        let year = FiscalYear::new(start);
        if year.end_year().rem_euclid(100) != end {
            return Err(FiscalYearParseError::Discontinuous);
        }
        Ok(year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn april_starts_a_new_year() {
        assert_eq!(FiscalYear::containing(&date(2024, 4, 1)).label(), "2024-25");
        assert_eq!(FiscalYear::containing(&date(2024, 12, 31)).label(), "2024-25");
    }

    #[test]
    fn first_quarter_belongs_to_previous_year() {
        assert_eq!(FiscalYear::containing(&date(2025, 1, 1)).label(), "2024-25");
        assert_eq!(FiscalYear::containing(&date(2025, 3, 31)).label(), "2024-25");
    }

    #[test]
    fn century_rollover_keeps_two_digits() {
        assert_eq!(FiscalYear::containing(&date(2099, 6, 1)).label(), "2099-00");
        assert_eq!(FiscalYear::containing(&date(2009, 6, 1)).label(), "2009-10");
        assert_eq!(FiscalYear::containing(&date(2000, 2, 1)).label(), "1999-00");
    }

    #[test]
    fn parses_labels() {
        assert_eq!("2024-25".parse(), Ok(FiscalYear::new(2024)));
        assert_eq!("2099-00".parse(), Ok(FiscalYear::new(2099)));
        assert_eq!(
            "2024-26".parse::<FiscalYear>(),
            Err(FiscalYearParseError::Discontinuous)
        );
        assert_eq!(
            "24-25".parse::<FiscalYear>(),
            Err(FiscalYearParseError::Shape)
        );
        assert_eq!(
            "2024/25".parse::<FiscalYear>(),
            Err(FiscalYearParseError::Shape)
        );
    }
}
