//! Per-series sequence counters that reset every financial year
use super::document::DocumentKind;
use super::error::{LifecycleError, Result, StoreContext};
use super::fiscal::FiscalYear;
use chrono::Datelike;
use sled::{Db, Tree};
use tracing::{debug, trace};

/// First value issued in a financial year.
pub const START_SEQUENCE: u64 = 2;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    #[n(0)]
    pub sequence: u64,
    #[n(1)]
    pub fiscal_year: String,
}

impl Counter {
    fn start(fiscal_year: String) -> Self {
        Self {
            sequence: START_SEQUENCE,
            fiscal_year,
        }
    }

    /// Whether this counter already issued values in a later year than
    /// `fiscal_year`. Labels that do not parse count as older.
    fn is_ahead_of(&self, fiscal_year: FiscalYear) -> bool {
        self.fiscal_year
            .parse::<FiscalYear>()
            .is_ok_and(|stored| stored > fiscal_year)
    }

    /// The counter state after issuing one value in `fiscal_year`.
    fn advance(&self, fiscal_year: &str) -> Self {
        if self.fiscal_year != fiscal_year {
            return Self::start(fiscal_year.to_string());
        }
        Self {
            sequence: self.sequence + 1,
            fiscal_year: self.fiscal_year.clone(),
        }
    }
}

pub struct SequenceCounter {
    tree: Tree,
}

impl SequenceCounter {
    pub fn open(db: &Db) -> Result<Self> {
        let tree = db
            .open_tree("counters")
            .during(|| "opening the counters tree".to_string())?;
        Ok(Self { tree })
    }

    /// Issues the next sequence value of `series` for the financial year
    /// containing `as_of`.
    ///
    /// The counter is created on first use and restarts at
    /// [`START_SEQUENCE`] when the financial year moves on. Every value is
    /// claimed with a compare-and-swap against the stored counter, so two
    /// callers never receive the same value for the same year.
    ///
    /// The year only moves forward. A date in a year before the stored one
    /// fails with [`LifecycleError::FiscalYearRewound`] rather than restarting
    /// the old year and reissuing its values.
    pub fn next_value<D: Datelike>(&self, series: &str, as_of: &D) -> Result<u64> {
        let requested = FiscalYear::containing(as_of);
        let fiscal_year = requested.label();

        loop {
            let current = self
                .tree
                .get(series)
                .during(|| format!("reading the {series} counter"))?;
            let next = match &current {
                None => Counter::start(fiscal_year.clone()),
                Some(bytes) => {
                    let stored = decode(series, bytes)?;
                    if stored.is_ahead_of(requested) {
                        return Err(LifecycleError::FiscalYearRewound {
                            series: series.to_string(),
                            stored: stored.fiscal_year,
                            requested: fiscal_year,
                        });
                    }
                    stored.advance(&fiscal_year)
                }
            };
            let bytes = encode(series, &next)?;

            let swapped = self
                .tree
                .compare_and_swap(series, current.as_ref(), Some(bytes))
                .during(|| format!("advancing the {series} counter"))?;
            match swapped {
                Ok(()) => {
                    if next.sequence == START_SEQUENCE {
                        debug!(series, %fiscal_year, "sequence started");
                    }
                    return Ok(next.sequence);
                }
                Err(_) => trace!(series, "counter contended, retrying"),
            }
        }
    }

    /// Current state of a counter without advancing it.
    pub fn peek(&self, series: &str) -> Result<Option<Counter>> {
        self.tree
            .get(series)
            .during(|| format!("reading the {series} counter"))?
            .map(|bytes| decode(series, &bytes))
            .transpose()
    }
}

fn encode(series: &str, counter: &Counter) -> Result<Vec<u8>> {
    minicbor::to_vec(counter).map_err(|source| LifecycleError::Encode {
        kind: DocumentKind::Counter,
        id: series.to_string(),
        source,
    })
}

fn decode(series: &str, bytes: &[u8]) -> Result<Counter> {
    minicbor::decode(bytes).map_err(|source| LifecycleError::Decode {
        kind: DocumentKind::Counter,
        id: series.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::{collections::HashSet, sync::Arc, thread};

    fn counter() -> (Arc<Db>, SequenceCounter) {
        let db = Arc::new(sled::Config::new().temporary(true).open().unwrap());
        let counter = SequenceCounter::open(&db).unwrap();
        (db, counter)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_value_is_two() {
        let (_db, counter) = counter();
        assert_eq!(counter.next_value("quotation", &date(2024, 6, 1)).unwrap(), 2);
        assert_eq!(counter.next_value("quotation", &date(2024, 6, 2)).unwrap(), 3);
        assert_eq!(
            counter.peek("quotation").unwrap(),
            Some(Counter {
                sequence: 3,
                fiscal_year: "2024-25".into()
            })
        );
    }

    #[test]
    fn series_are_independent() {
        let (_db, counter) = counter();
        let day = date(2024, 6, 1);
        counter.next_value("quotation", &day).unwrap();
        counter.next_value("quotation", &day).unwrap();
        assert_eq!(counter.next_value("contract", &day).unwrap(), 2);
        assert_eq!(counter.next_value("quotation", &day).unwrap(), 4);
    }

    #[test]
    fn resets_when_the_financial_year_changes() {
        let (_db, counter) = counter();
        for _ in 0..5 {
            counter.next_value("contract", &date(2025, 3, 31)).unwrap();
        }
        assert_eq!(counter.next_value("contract", &date(2025, 4, 1)).unwrap(), 2);
        assert_eq!(counter.next_value("contract", &date(2025, 4, 2)).unwrap(), 3);
    }

    #[test]
    fn refuses_to_move_back_a_year() {
        let (_db, counter) = counter();
        counter.next_value("contract", &date(2025, 4, 2)).unwrap();
        counter.next_value("contract", &date(2025, 4, 3)).unwrap();

        let err = counter.next_value("contract", &date(2025, 3, 31)).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::FiscalYearRewound { ref stored, ref requested, .. }
                if stored == "2025-26" && requested == "2024-25"
        ));
        // the current year carries on untouched
        assert_eq!(counter.next_value("contract", &date(2025, 4, 4)).unwrap(), 4);
    }

    #[test]
    fn unreadable_year_labels_restart_the_count() {
        let (db, counter) = counter();
        let legacy = Counter {
            sequence: 40,
            fiscal_year: "FY25".into(),
        };
        db.open_tree("counters")
            .unwrap()
            .insert("quotation", minicbor::to_vec(&legacy).unwrap())
            .unwrap();
        assert_eq!(counter.next_value("quotation", &date(2024, 6, 1)).unwrap(), 2);
    }

    #[test]
    fn concurrent_callers_never_share_a_value() {
        let (db, _) = counter();
        let workers = 8;
        let per_worker = 50;

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    let counter = SequenceCounter::open(&db).unwrap();
                    (0..per_worker)
                        .map(|_| counter.next_value("quotation", &date(2024, 8, 15)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "{value} issued twice");
            }
        }
        assert_eq!(seen.len(), workers * per_worker);
        assert_eq!(seen.iter().min(), Some(&START_SEQUENCE));
        assert_eq!(
            seen.iter().max(),
            Some(&(START_SEQUENCE + (workers * per_worker) as u64 - 1))
        );
    }
}
