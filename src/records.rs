//! Dependent records owned by a quotation or contract
use super::document::{DocumentKind, TimeStamp};
use super::store::Record;
use chrono::Utc;

// A priced line of a quotation, shared with the contract it converts into.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct LineItem {
    #[n(0)]
    id: String,
    #[n(1)]
    pub description: String,
    #[n(2)]
    pub quantity: u64,
    #[n(3)]
    pub rate: u64, // minor currency units
}

impl LineItem {
    pub fn new(description: &str, quantity: u64, rate: u64) -> Self {
        Self {
            id: String::new(),
            description: description.to_string(),
            quantity,
            rate,
        }
    }
    pub fn amount(&self) -> u64 {
        self.quantity.saturating_mul(self.rate)
    }
}

// Delivery challan raised against a contract.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryRecord {
    #[n(0)]
    id: String,
    #[n(1)]
    pub challan_no: String,
    #[n(2)]
    pub delivered_on: TimeStamp<Utc>,
}

impl DeliveryRecord {
    pub fn new(challan_no: &str, delivered_on: TimeStamp<Utc>) -> Self {
        Self {
            id: String::new(),
            challan_no: challan_no.to_string(),
            delivered_on,
        }
    }
}

// A single work completion entry listed on the contract.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkLogEntry {
    #[n(0)]
    id: String,
    #[n(1)]
    pub area_treated: u64,
    #[n(2)]
    pub logged_at: TimeStamp<Utc>,
    #[n(3)]
    pub remarks: String,
}

impl WorkLogEntry {
    pub fn new(area_treated: u64, logged_at: TimeStamp<Utc>, remarks: &str) -> Self {
        Self {
            id: String::new(),
            area_treated,
            logged_at,
            remarks: remarks.to_string(),
        }
    }
}

/// Per-contract roll up of work done, linked by `contract_id` only.
/// A contract has at most one; its id is derived from the contract id.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkLogSummary {
    #[n(0)]
    id: String,
    #[n(1)]
    pub(crate) contract_id: String,
    #[n(2)]
    pub total_area: u64,
    #[n(3)]
    pub completed: bool,
}

impl WorkLogSummary {
    pub fn new(total_area: u64, completed: bool) -> Self {
        Self {
            id: String::new(),
            contract_id: String::new(),
            total_area,
            completed,
        }
    }
    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }
}

/// Snapshot of a root document's number, linked back by foreign key.
/// Archives written by the service are keyed by their owner, one each.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveRecord {
    #[n(0)]
    id: String,
    #[n(1)]
    pub(crate) quotation_id: Option<String>,
    #[n(2)]
    pub(crate) contract_id: Option<String>,
    #[n(3)]
    pub(crate) number: Option<String>,
    #[n(4)]
    pub(crate) archived_at: TimeStamp<Utc>,
}

impl ArchiveRecord {
    pub fn quotation_id(&self) -> Option<&str> {
        self.quotation_id.as_deref()
    }
    pub fn contract_id(&self) -> Option<&str> {
        self.contract_id.as_deref()
    }
    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }
    pub fn archived_at(&self) -> &TimeStamp<Utc> {
        &self.archived_at
    }
}

macro_rules! record {
    ($ty:ty, $kind:expr, $prefix:literal) => {
        impl Record for $ty {
            const KIND: DocumentKind = $kind;
            const ID_PREFIX: &'static str = $prefix;

            fn id(&self) -> &str {
                &self.id
            }
            fn assign_id(&mut self, id: String) {
                self.id = id;
            }
        }
    };
}

record!(LineItem, DocumentKind::LineItem, "item_");
record!(DeliveryRecord, DocumentKind::DeliveryRecord, "dc_");
record!(WorkLogEntry, DocumentKind::WorkLog, "wlog_");
record!(WorkLogSummary, DocumentKind::WorkLogSummary, "wsum_");
record!(ArchiveRecord, DocumentKind::Archive, "arch_");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_item_amount_saturates() {
        assert_eq!(LineItem::new("chemical", 3, 250).amount(), 750);
        assert_eq!(LineItem::new("chemical", u64::MAX, 2).amount(), u64::MAX);
    }

    #[test]
    fn records_start_without_ids() {
        let mut item = LineItem::new("spray", 1, 1);
        assert_eq!(item.id(), "");
        item.assign_id("item_1".into());
        assert_eq!(item.id(), "item_1");
    }
}
