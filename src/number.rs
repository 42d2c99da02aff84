//! Document number grammar
//!
//! A document number is a base (series prefix, financial year and sequence)
//! plus an optional revision suffix:
//!
//! ```text
//! EPPL/ATT/QTN/2024-25/12        quotation
//! EPPL/ATT/QTN/2024-25/12/R3     quotation, third revision
//! PRE/2024-25/7                  contract
//! OS/PRE/2024-25/7/R1            contract raised under the OS flag, first revision
//! ```
use super::error::{LifecycleError, Result};
use super::fiscal::FiscalYear;
use std::fmt;

const QUOTATION_PREFIX: [&str; 3] = ["EPPL", "ATT", "QTN"];
const CONTRACT_PREFIX: &str = "PRE";
const OS_PREFIX: &str = "OS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    Quotation,
    Contract,
}

impl Series {
    /// Key of the counter this series draws its sequence from.
    pub const fn key(&self) -> &'static str {
        match self {
            Series::Quotation => "quotation",
            Series::Contract => "contract",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberBase {
    Quotation {
        fiscal_year: FiscalYear,
        sequence: u64,
    },
    Contract {
        os: bool,
        fiscal_year: FiscalYear,
        sequence: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNumber {
    pub base: NumberBase,
    pub revision: Option<u32>,
}

impl DocumentNumber {
    /// Builds the unrevised number for a freshly drawn sequence value.
    /// The OS flag only affects contracts.
    pub fn mint(series: Series, fiscal_year: FiscalYear, sequence: u64, os: bool) -> Self {
        let base = match series {
            Series::Quotation => NumberBase::Quotation {
                fiscal_year,
                sequence,
            },
            Series::Contract => NumberBase::Contract {
                os,
                fiscal_year,
                sequence,
            },
        };
        Self {
            base,
            revision: None,
        }
    }

    pub fn series(&self) -> Series {
        match self.base {
            NumberBase::Quotation { .. } => Series::Quotation,
            NumberBase::Contract { .. } => Series::Contract,
        }
    }

    /// The next link in the revision chain: `R1` for an unrevised number,
    /// otherwise the existing revision plus one.
    pub fn revised(&self) -> Self {
        Self {
            base: self.base.clone(),
            revision: Some(self.revision.map_or(1, |r| r.saturating_add(1))),
        }
    }

    pub fn parse(series: Series, text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split('/').collect();
        let malformed = |reason: &str| LifecycleError::MalformedIdentifier {
            series,
            identifier: text.to_string(),
            reason: reason.to_string(),
        };

        let (os, rest) = match series {
            Series::Quotation => {
                if parts.len() < 5 || parts[..3] != QUOTATION_PREFIX {
                    return Err(malformed("expected EPPL/ATT/QTN prefix"));
                }
                (false, &parts[3..])
            }
            Series::Contract => {
                let os = parts.len() > 3 && parts[0] == OS_PREFIX;
                let rest = if os { &parts[1..] } else { &parts[..] };
                if rest.len() < 3 || rest[0] != CONTRACT_PREFIX {
                    return Err(malformed("expected PRE or OS/PRE prefix"));
                }
                (os, &rest[1..])
            }
        };

        // rest is now [fiscal year, sequence, revision?]
        if rest.len() > 3 {
            return Err(malformed("unexpected trailing segments"));
        }
        let fiscal_year: FiscalYear = rest[0]
            .parse()
            .map_err(|e: super::fiscal::FiscalYearParseError| malformed(&e.to_string()))?;
        let sequence = parse_digits(rest[1]).ok_or_else(|| malformed("sequence is not a canonical number"))?;
        let revision = match rest.get(2) {
            Some(token) => Some(
                token
                    .strip_prefix('R')
                    .and_then(parse_digits)
                    .and_then(|r| u32::try_from(r).ok())
                    .ok_or_else(|| malformed("revision must look like R<n>"))?,
            ),
            None => None,
        };

        Ok(Self {
            base: DocumentNumber::mint(series, fiscal_year, sequence, os).base,
            revision,
        })
    }
}

// Zero padded values are not canonical: printing them back would change the
// number, so they are left to the positional path.
fn parse_digits(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    token.parse().ok()
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            NumberBase::Quotation {
                fiscal_year,
                sequence,
            } => write!(f, "{}/{fiscal_year}/{sequence}", QUOTATION_PREFIX.join("/"))?,
            NumberBase::Contract {
                os,
                fiscal_year,
                sequence,
            } => {
                if *os {
                    write!(f, "{OS_PREFIX}/")?;
                }
                write!(f, "{CONTRACT_PREFIX}/{fiscal_year}/{sequence}")?
            }
        }
        if let Some(revision) = self.revision {
            write!(f, "/R{revision}")?;
        }
        Ok(())
    }
}

/// Renders the canonical identifier for a series, financial year and sequence.
pub fn format_number(series: Series, fiscal_year: FiscalYear, sequence: u64, os: bool) -> String {
    DocumentNumber::mint(series, fiscal_year, sequence, os).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fy() -> FiscalYear {
        FiscalYear::new(2024)
    }

    #[test]
    fn formats_each_series() {
        assert_eq!(
            format_number(Series::Quotation, fy(), 12, false),
            "EPPL/ATT/QTN/2024-25/12"
        );
        // the OS flag is a contract concern only
        assert_eq!(
            format_number(Series::Quotation, fy(), 12, true),
            "EPPL/ATT/QTN/2024-25/12"
        );
        assert_eq!(format_number(Series::Contract, fy(), 7, false), "PRE/2024-25/7");
        assert_eq!(format_number(Series::Contract, fy(), 7, true), "OS/PRE/2024-25/7");
    }

    #[test]
    fn parses_revised_numbers() {
        let n = DocumentNumber::parse(Series::Contract, "OS/PRE/2024-25/7/R3").unwrap();
        assert_eq!(n.revision, Some(3));
        assert_eq!(
            n.base,
            NumberBase::Contract {
                os: true,
                fiscal_year: fy(),
                sequence: 7
            }
        );

        let q = DocumentNumber::parse(Series::Quotation, "EPPL/ATT/QTN/2024-25/12/R1").unwrap();
        assert_eq!(q.revision, Some(1));
        assert_eq!(q.series(), Series::Quotation);
    }

    #[test]
    fn revision_chain() {
        let n = DocumentNumber::mint(Series::Contract, fy(), 7, false);
        let r1 = n.revised();
        let r2 = r1.revised();
        assert_eq!(r1.to_string(), "PRE/2024-25/7/R1");
        assert_eq!(r2.to_string(), "PRE/2024-25/7/R2");
    }

    #[test]
    fn rejects_malformed_numbers() {
        for bad in [
            "EPPL/ATT/QTN/2024-25",
            "EPPL/ATT/QTN/2024-25/12/R1/R2",
            "EPPL/ATT/QTN/2024-25/x",
            "EPPL/ATT/QTN/2024-25/12/X1",
            "EPPL/ATT/QTN/2024-25/12/R",
            "EPPL/ATT/QTN/2024-25/012",
            "EPPL/ATT/QTN/2024-25/12/R01",
            "EPPL/ATT/INV/2024-25/12",
        ] {
            assert!(
                matches!(
                    DocumentNumber::parse(Series::Quotation, bad),
                    Err(LifecycleError::MalformedIdentifier { .. })
                ),
                "{bad} should be rejected"
            );
        }
        for bad in ["PRE/2024-25", "OS/PRE/2024-25", "CTR/2024-25/7", "PRE/2024-26/7"] {
            assert!(DocumentNumber::parse(Series::Contract, bad).is_err(), "{bad}");
        }
    }
}
