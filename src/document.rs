//! Root documents: quotations and the contracts they convert into
use super::number::Series;
use super::store::{Collection, Record, Store};
use chrono::{DateTime, TimeZone, Utc};
use sealed::Lifecycle;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Counter,
    Quotation,
    Contract,
    LineItem,
    DeliveryRecord,
    WorkLog,
    WorkLogSummary,
    Archive,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentKind::Counter => "counter",
            DocumentKind::Quotation => "quotation",
            DocumentKind::Contract => "contract",
            DocumentKind::LineItem => "line item",
            DocumentKind::DeliveryRecord => "delivery record",
            DocumentKind::WorkLog => "work log",
            DocumentKind::WorkLogSummary => "work log summary",
            DocumentKind::Archive => "archive record",
        })
    }
}

/// Subtype of a sales document. Affects document content, never the number.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocType {
    #[n(0)]
    #[default]
    Standard,
    #[n(1)]
    SupplyApply,
    #[n(2)]
    Supply,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone + Eq> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone + Eq> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A document that is approved into a numbered series and owns dependent records.
///
/// State changes live on a sealed supertrait, so only
/// [`DocumentService`](crate::service::DocumentService) can number a document
/// and the "number iff approved" invariant holds for every stored record.
pub trait RootDocument: Record + Clone + sealed::Lifecycle {
    const SERIES: Series;

    fn collection(store: &Store) -> &Collection<Self>;
    fn number(&self) -> Option<&str>;
    fn is_approved(&self) -> bool;
    fn approved_at(&self) -> Option<&TimeStamp<Utc>>;
    fn print_count(&self) -> u64;
    fn line_items(&self) -> &[String];
    /// Organisational flag carried into the number. Only contracts use it.
    fn os(&self) -> bool {
        false
    }
}

pub(crate) mod sealed {
    use super::TimeStamp;
    use chrono::Utc;

    pub trait Lifecycle {
        fn approve_with(&mut self, number: String, at: TimeStamp<Utc>);
        fn set_number(&mut self, number: String);
        fn bump_print_count(&mut self) -> u64;
        fn push_line_item(&mut self, id: String);
        fn touch(&mut self);
    }
}

// Key is the bech32 id
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Quotation {
    #[n(0)]
    id: String,
    #[n(1)]
    quotation_no: Option<String>,
    #[n(2)]
    quotation_date: Option<TimeStamp<Utc>>,
    #[n(3)]
    approved: bool,
    #[n(4)]
    contractified: bool,
    #[n(5)]
    doc_type: DocType,
    #[n(6)]
    project_name: String,
    #[n(7)]
    print_count: u64,
    #[n(8)]
    quote_info: Vec<String>,
    #[n(9)]
    created_at: TimeStamp<Utc>,
    #[n(10)]
    updated_at: TimeStamp<Utc>,
}

impl Default for Quotation {
    fn default() -> Self {
        Self::new()
    }
}

impl Quotation {
    /// A fresh draft. The id is assigned when the draft is stored.
    pub fn new() -> Self {
        let now = TimeStamp::new();
        Self {
            id: String::new(),
            quotation_no: None,
            quotation_date: None,
            approved: false,
            contractified: false,
            doc_type: DocType::Standard,
            project_name: String::new(),
            print_count: 0,
            quote_info: vec![],
            created_at: now.clone(),
            updated_at: now,
        }
    }
    pub fn set_doc_type(mut self, doc_type: DocType) -> Self {
        self.doc_type = doc_type;
        self
    }
    pub fn set_project_name(mut self, name: &str) -> Self {
        self.project_name = name.to_string();
        self
    }
    pub fn doc_type(&self) -> DocType {
        self.doc_type
    }
    pub fn project_name(&self) -> &str {
        &self.project_name
    }
    pub fn is_contractified(&self) -> bool {
        self.contractified
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }
    pub(crate) fn mark_contractified(&mut self) {
        self.contractified = true;
        self.touch();
    }
    /// Subject line printed on the quotation.
    pub fn subject(&self) -> String {
        match self.doc_type {
            DocType::Supply => "Supply Offer for Chemical as per your requirement.".to_string(),
            _ => format!(
                "Pre Construction Anti Termite Treatment to your {}",
                self.project_name
            ),
        }
    }
}

impl Record for Quotation {
    const KIND: DocumentKind = DocumentKind::Quotation;
    const ID_PREFIX: &'static str = "qtn_";

    fn id(&self) -> &str {
        &self.id
    }
    fn assign_id(&mut self, id: String) {
        self.id = id;
    }
}

impl RootDocument for Quotation {
    const SERIES: Series = Series::Quotation;

    fn collection(store: &Store) -> &Collection<Self> {
        &store.quotations
    }
    fn number(&self) -> Option<&str> {
        self.quotation_no.as_deref()
    }
    fn is_approved(&self) -> bool {
        self.approved
    }
    fn approved_at(&self) -> Option<&TimeStamp<Utc>> {
        self.quotation_date.as_ref()
    }
    fn print_count(&self) -> u64 {
        self.print_count
    }
    fn line_items(&self) -> &[String] {
        &self.quote_info
    }
}

impl sealed::Lifecycle for Quotation {
    fn approve_with(&mut self, number: String, at: TimeStamp<Utc>) {
        self.approved = true;
        self.quotation_no = Some(number);
        self.quotation_date = Some(at.clone());
        self.updated_at = at;
    }
    fn set_number(&mut self, number: String) {
        self.quotation_no = Some(number);
        self.touch();
    }
    fn bump_print_count(&mut self) -> u64 {
        self.print_count += 1;
        self.touch();
        self.print_count
    }
    fn push_line_item(&mut self, id: String) {
        self.quote_info.push(id);
        self.touch();
    }
    fn touch(&mut self) {
        self.updated_at = TimeStamp::new();
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    #[n(0)]
    id: String,
    #[n(1)]
    quotation: Option<String>, // back reference to the originating quotation
    #[n(2)]
    os: bool,
    #[n(3)]
    contract_date: Option<TimeStamp<Utc>>,
    #[n(4)]
    contract_no: Option<String>,
    #[n(5)]
    approved: bool,
    #[n(6)]
    doc_type: DocType,
    #[n(7)]
    print_count: u64,
    #[n(8)]
    quote_info: Vec<String>,
    #[n(9)]
    dcs: Vec<String>,
    #[n(10)]
    worklogs: Vec<String>,
    #[n(11)]
    warranty: Option<String>,
    #[n(12)]
    work_order_no: String,
    #[n(13)]
    created_at: TimeStamp<Utc>,
    #[n(14)]
    updated_at: TimeStamp<Utc>,
}

impl Default for Contract {
    fn default() -> Self {
        Self::new()
    }
}

impl Contract {
    pub fn new() -> Self {
        let now = TimeStamp::new();
        Self {
            id: String::new(),
            quotation: None,
            os: false,
            contract_date: None,
            contract_no: None,
            approved: false,
            doc_type: DocType::Standard,
            print_count: 0,
            quote_info: vec![],
            dcs: vec![],
            worklogs: vec![],
            warranty: None,
            work_order_no: String::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
    pub fn set_os(mut self, os: bool) -> Self {
        self.os = os;
        self
    }
    pub fn set_doc_type(mut self, doc_type: DocType) -> Self {
        self.doc_type = doc_type;
        self
    }
    pub fn set_work_order_no(mut self, work_order_no: &str) -> Self {
        self.work_order_no = work_order_no.to_string();
        self
    }
    /// Draft created from an approved quotation, sharing its line items.
    pub(crate) fn from_quotation(quotation: &Quotation, os: bool) -> Self {
        let mut contract = Self::new().set_os(os).set_doc_type(quotation.doc_type);
        contract.quotation = Some(quotation.id.clone());
        contract.quote_info = quotation.quote_info.clone();
        contract
    }
    pub fn quotation(&self) -> Option<&str> {
        self.quotation.as_deref()
    }
    pub fn doc_type(&self) -> DocType {
        self.doc_type
    }
    pub fn delivery_records(&self) -> &[String] {
        &self.dcs
    }
    pub fn work_logs(&self) -> &[String] {
        &self.worklogs
    }
    pub fn warranty(&self) -> Option<&str> {
        self.warranty.as_deref()
    }
    pub fn work_order_no(&self) -> &str {
        &self.work_order_no
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }
    pub(crate) fn push_delivery_record(&mut self, id: String) {
        self.dcs.push(id);
        self.touch();
    }
    pub(crate) fn push_work_log(&mut self, id: String) {
        self.worklogs.push(id);
        self.touch();
    }
    pub(crate) fn set_warranty(&mut self, warranty: String) {
        self.warranty = Some(warranty);
        self.touch();
    }
}

impl Record for Contract {
    const KIND: DocumentKind = DocumentKind::Contract;
    const ID_PREFIX: &'static str = "ctr_";

    fn id(&self) -> &str {
        &self.id
    }
    fn assign_id(&mut self, id: String) {
        self.id = id;
    }
}

impl RootDocument for Contract {
    const SERIES: Series = Series::Contract;

    fn collection(store: &Store) -> &Collection<Self> {
        &store.contracts
    }
    fn number(&self) -> Option<&str> {
        self.contract_no.as_deref()
    }
    fn is_approved(&self) -> bool {
        self.approved
    }
    fn approved_at(&self) -> Option<&TimeStamp<Utc>> {
        self.contract_date.as_ref()
    }
    fn print_count(&self) -> u64 {
        self.print_count
    }
    fn line_items(&self) -> &[String] {
        &self.quote_info
    }
    fn os(&self) -> bool {
        self.os
    }
}

impl sealed::Lifecycle for Contract {
    fn approve_with(&mut self, number: String, at: TimeStamp<Utc>) {
        self.approved = true;
        self.contract_no = Some(number);
        self.contract_date = Some(at.clone());
        self.updated_at = at;
    }
    fn set_number(&mut self, number: String) {
        self.contract_no = Some(number);
        self.touch();
    }
    fn bump_print_count(&mut self) -> u64 {
        self.print_count += 1;
        self.touch();
        self.print_count
    }
    fn push_line_item(&mut self, id: String) {
        self.quote_info.push(id);
        self.touch();
    }
    fn touch(&mut self) {
        self.updated_at = TimeStamp::new();
    }
}
