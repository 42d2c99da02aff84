//! Service layer API for the quotation and contract lifecycle
use super::cascade::{Cascade, CascadeDeleter, DeleteFilter, DeletionPlan};
use super::config::Config;
use super::counter::SequenceCounter;
use super::document::sealed::Lifecycle;
use super::document::{Contract, Quotation, RootDocument, TimeStamp};
use super::error::{LifecycleError, Result};
use super::fiscal::FiscalYear;
use super::number::{DocumentNumber, Series};
use super::records::{ArchiveRecord, DeliveryRecord, LineItem, WorkLogEntry, WorkLogSummary};
use super::revision::next_revision;
use super::store::{Collection, Record, Store, decode, encode, settle};
use super::utils::{new_record_id, owned_record_id};
use chrono::{DateTime, NaiveDate, Utc};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct DocumentService {
    store: Store,
    counter: SequenceCounter,
    config: Config,
}

impl DocumentService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self> {
        Self::with_config(instance, Config::default())
    }

    pub fn with_config(instance: Arc<sled::Db>, config: Config) -> Result<Self> {
        let counter = SequenceCounter::open(&instance)?;
        let store = Store::open(instance)?;
        Ok(Self {
            store,
            counter,
            config,
        })
    }

    /// Opens the database described by `config` and builds a service over it.
    pub fn open(config: Config) -> Result<Self> {
        let db = config.open()?;
        Self::with_config(Arc::new(db), config)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn counter(&self) -> &SequenceCounter {
        &self.counter
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get<D: RootDocument>(&self, id: &str) -> Result<Option<D>> {
        D::collection(&self.store).get(id)
    }

    /// Store a new draft quotation
    pub fn create_quotation(&self, draft: Quotation) -> Result<Quotation> {
        self.create(draft)
    }

    /// Store a new draft contract
    pub fn create_contract(&self, draft: Contract) -> Result<Contract> {
        self.create(draft)
    }

    fn create<D: RootDocument>(&self, mut draft: D) -> Result<D> {
        if draft.is_approved() || draft.number().is_some() {
            return Err(LifecycleError::InvalidDraft {
                kind: D::KIND,
                id: draft.id().to_string(),
                reason: "drafts are stored unapproved and unnumbered",
            });
        }
        draft.assign_id(new_record_id(D::ID_PREFIX)?);
        D::collection(&self.store).insert(&draft)?;
        Ok(draft)
    }

    /// Store a document that was approved and numbered outside this engine,
    /// such as a record carried over from an earlier system.
    ///
    /// The number is kept verbatim and does not advance any counter. It is
    /// still subject to the uniqueness check of later approvals.
    #[instrument(skip(self, draft))]
    pub fn import_approved<D: RootDocument>(
        &self,
        mut draft: D,
        number: &str,
        approved_at: DateTime<Utc>,
    ) -> Result<D> {
        if draft.is_approved() || draft.number().is_some() {
            return Err(LifecycleError::InvalidDraft {
                kind: D::KIND,
                id: draft.id().to_string(),
                reason: "only unnumbered drafts can be imported",
            });
        }
        if number.trim().is_empty() {
            return Err(LifecycleError::InvalidDraft {
                kind: D::KIND,
                id: draft.id().to_string(),
                reason: "imported documents need a number",
            });
        }
        draft.approve_with(number.to_string(), TimeStamp::from(approved_at));
        draft.assign_id(new_record_id(D::ID_PREFIX)?);
        D::collection(&self.store).insert(&draft)?;

        let kind = D::KIND;
        info!(%kind, id = draft.id(), number, "imported approved document");
        Ok(draft)
    }

    /// Approve a draft, minting its number from the current date
    pub fn approve<D: RootDocument>(&self, id: &str) -> Result<D> {
        self.approve_at(id, Utc::now())
    }

    /// Approve a draft as of `now`.
    ///
    /// The number is drawn from the series counter for the financial year of
    /// `now` in the configured business time zone. Approval happens once: a
    /// second attempt fails with [`LifecycleError::AlreadyApproved`], including
    /// when two approvals of the same draft race.
    ///
    /// Counters never move back a year: backdating `now` into a financial
    /// year before the series' current one fails with
    /// [`LifecycleError::FiscalYearRewound`] instead of reissuing numbers.
    #[instrument(skip(self))]
    pub fn approve_at<D: RootDocument>(&self, id: &str, now: DateTime<Utc>) -> Result<D> {
        let business_date = now.with_timezone(&self.config.utc_offset()).date_naive();

        let approved = D::collection(&self.store).update(id, |doc| {
            if doc.is_approved() {
                return Err(LifecycleError::AlreadyApproved {
                    kind: D::KIND,
                    id: id.to_string(),
                });
            }
            let number = self.mint::<D>(doc.os(), &business_date)?;
            doc.approve_with(number, TimeStamp::from(now));
            Ok(true)
        })?;

        let kind = D::KIND;
        info!(%kind, id, number = ?approved.number(), "approved");
        Ok(approved)
    }

    fn mint<D: RootDocument>(&self, os: bool, business_date: &NaiveDate) -> Result<String> {
        let series = D::SERIES;
        let verify = match series {
            Series::Quotation => true,
            Series::Contract => self.config.verify_contract_numbers(),
        };
        let fiscal_year = FiscalYear::containing(business_date);
        let attempts = self.config.max_mint_attempts();

        for attempt in 1..=attempts {
            let sequence = self.counter.next_value(series.key(), business_date)?;
            let minted = DocumentNumber::mint(series, fiscal_year, sequence, os);
            if !verify || !self.number_in_use::<D>(&minted)? {
                return Ok(minted.to_string());
            }
            warn!(%series, number = %minted, attempt, "minted number already in use");
        }
        Err(LifecycleError::NumberExhausted { series, attempts })
    }

    /// Whether any stored document already carries `minted` or a revision of it.
    fn number_in_use<D: RootDocument>(&self, minted: &DocumentNumber) -> Result<bool> {
        let text = minted.to_string();
        let clash = D::collection(&self.store).find(|doc| match doc.number() {
            Some(existing) => match DocumentNumber::parse(D::SERIES, existing) {
                Ok(parsed) => parsed.base == minted.base,
                Err(_) => existing == text,
            },
            None => false,
        })?;
        Ok(clash.is_some())
    }

    /// Move an approved document to the next revision of its number.
    ///
    /// Returns the new number, or `None` when there is nothing to revise:
    /// the document does not exist, is still a draft or carries no number.
    #[instrument(skip(self))]
    pub fn revise_number<D: RootDocument>(&self, id: &str) -> Result<Option<String>> {
        let lenient = self.config.lenient_revisions();
        let mut revised = None;

        let result = D::collection(&self.store).update(id, |doc| {
            revised = None;
            let Some(current) = doc.number().filter(|_| doc.is_approved()) else {
                return Ok(false);
            };
            let next = next_revision(D::SERIES, current, lenient).inspect_err(|err| {
                warn!(id, %err, "cannot revise number");
            })?;
            doc.set_number(next.clone());
            revised = Some(next);
            Ok(true)
        });

        match result {
            Ok(_) => {
                if let Some(number) = &revised {
                    info!(id, %number, "number revised");
                }
                Ok(revised)
            }
            Err(LifecycleError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Record one more print of the document, returning the new count
    pub fn increment_print_count<D: RootDocument>(&self, id: &str) -> Result<u64> {
        let doc = D::collection(&self.store).update(id, |doc| {
            doc.bump_print_count();
            Ok(true)
        })?;
        Ok(doc.print_count())
    }

    /// Approval flag of a document; false when it does not exist
    pub fn is_approved<D: RootDocument>(&self, id: &str) -> Result<bool> {
        Ok(self.get::<D>(id)?.is_some_and(|doc| doc.is_approved()))
    }

    /// Add a line item to a quotation or contract
    pub fn add_line_item<D: RootDocument>(&self, owner_id: &str, item: LineItem) -> Result<LineItem> {
        self.attach::<D, _, _>(owner_id, &self.store.line_items, item, |owner, id| {
            owner.push_line_item(id)
        })
    }

    pub fn add_delivery_record(
        &self,
        contract_id: &str,
        record: DeliveryRecord,
    ) -> Result<DeliveryRecord> {
        self.attach::<Contract, _, _>(
            contract_id,
            &self.store.delivery_records,
            record,
            |contract, id| contract.push_delivery_record(id),
        )
    }

    pub fn add_work_log(&self, contract_id: &str, entry: WorkLogEntry) -> Result<WorkLogEntry> {
        self.attach::<Contract, _, _>(contract_id, &self.store.work_logs, entry, |contract, id| {
            contract.push_work_log(id)
        })
    }

    /// Inserts `record` and links it into its owner's reference list in one
    /// transaction.
    fn attach<D, R, L>(
        &self,
        owner_id: &str,
        records: &Collection<R>,
        mut record: R,
        link: L,
    ) -> Result<R>
    where
        D: RootDocument,
        R: Record,
        L: Fn(&mut D, String),
    {
        let record_id = new_record_id(R::ID_PREFIX)?;
        record.assign_id(record_id.clone());
        let bytes = encode(&record)?;

        let owners = D::collection(&self.store);
        let result: TransactionResult<(), LifecycleError> = (owners.tree(), records.tree())
            .transaction(|(owner_tx, record_tx)| {
                let current = owner_tx.get(owner_id.as_bytes())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(LifecycleError::NotFound {
                        kind: D::KIND,
                        id: owner_id.to_string(),
                    })
                })?;
                let mut owner: D =
                    decode(owner_id, &current).map_err(ConflictableTransactionError::Abort)?;
                link(&mut owner, record_id.clone());
                let owner_bytes = encode(&owner).map_err(ConflictableTransactionError::Abort)?;

                owner_tx.insert(owner_id.as_bytes(), owner_bytes)?;
                record_tx.insert(record_id.as_bytes(), bytes.clone())?;
                Ok(())
            });

        settle(
            result,
            &format!("attaching {} {record_id} to {} {owner_id}", R::KIND, D::KIND),
        )?;
        Ok(record)
    }

    /// Store the work log summary of a contract, replacing any previous one
    pub fn record_work_log_summary(
        &self,
        contract_id: &str,
        summary: WorkLogSummary,
    ) -> Result<WorkLogSummary> {
        let summaries = &self.store.work_log_summaries;
        self.upsert_owned::<Contract, _, _>(contract_id, summaries, |_, id| {
            let mut summary = summary.clone();
            summary.assign_id(id);
            summary.contract_id = contract_id.to_string();
            summary
        })
    }

    /// Snapshot a quotation's current number into its archive record
    pub fn archive_quotation(&self, quotation_id: &str) -> Result<ArchiveRecord> {
        let archives = &self.store.archives;
        self.upsert_owned::<Quotation, _, _>(quotation_id, archives, |quotation, id| {
            let mut archive = ArchiveRecord::default();
            archive.assign_id(id);
            archive.quotation_id = Some(quotation_id.to_string());
            archive.number = quotation.number().map(str::to_string);
            archive.archived_at = TimeStamp::new();
            archive
        })
    }

    /// Snapshot a contract's current number into its archive record
    pub fn archive_contract(&self, contract_id: &str) -> Result<ArchiveRecord> {
        let archives = &self.store.archives;
        self.upsert_owned::<Contract, _, _>(contract_id, archives, |contract, id| {
            let mut archive = ArchiveRecord::default();
            archive.assign_id(id);
            archive.contract_id = Some(contract_id.to_string());
            archive.number = contract.number().map(str::to_string);
            archive.archived_at = TimeStamp::new();
            archive
        })
    }

    /// Writes the one record of kind `R` that an owner may hold, replacing
    /// any previous version.
    ///
    /// The record id is derived from the owner id, so concurrent writers
    /// overwrite each other instead of leaving a second copy behind. The
    /// owner is touched in the same transaction, which makes a cascade
    /// delete collected before this write abort instead of missing it.
    fn upsert_owned<D, R, B>(
        &self,
        owner_id: &str,
        records: &Collection<R>,
        build: B,
    ) -> Result<R>
    where
        D: RootDocument,
        R: Record,
        B: Fn(&D, String) -> R,
    {
        let owners = D::collection(&self.store);

        let result: TransactionResult<R, LifecycleError> = (owners.tree(), records.tree())
            .transaction(|(owner_tx, record_tx)| {
                let abort = ConflictableTransactionError::Abort;
                let current = owner_tx.get(owner_id.as_bytes())?.ok_or_else(|| {
                    abort(LifecycleError::NotFound {
                        kind: D::KIND,
                        id: owner_id.to_string(),
                    })
                })?;
                let record_id = owned_record_id(R::ID_PREFIX, owner_id).map_err(abort)?;
                let mut owner: D = decode(owner_id, &current).map_err(abort)?;
                let record = build(&owner, record_id.clone());
                owner.touch();

                owner_tx.insert(owner_id.as_bytes(), encode(&owner).map_err(abort)?)?;
                record_tx.insert(record_id.as_bytes(), encode(&record).map_err(abort)?)?;
                Ok(record)
            });

        settle(result, &format!("writing the {} of {} {owner_id}", R::KIND, D::KIND))
    }

    /// Link a warranty to a contract. Warranties are not owned by the contract.
    pub fn attach_warranty(&self, contract_id: &str, warranty: &str) -> Result<Contract> {
        self.store.contracts.update(contract_id, |contract| {
            contract.set_warranty(warranty.to_string());
            Ok(true)
        })
    }

    /// Raise a draft contract from an approved quotation.
    ///
    /// The contract references the quotation and shares its line items. A
    /// quotation converts once.
    #[instrument(skip(self))]
    pub fn convert_to_contract(&self, quotation_id: &str, os: bool) -> Result<Contract> {
        let contract_id = new_record_id(Contract::ID_PREFIX)?;
        let store = &self.store;

        let result: TransactionResult<Contract, LifecycleError> =
            (store.quotations.tree(), store.contracts.tree()).transaction(
                |(quotations, contracts)| {
                    let abort = ConflictableTransactionError::Abort;
                    let current = quotations.get(quotation_id.as_bytes())?.ok_or_else(|| {
                        abort(LifecycleError::NotFound {
                            kind: Quotation::KIND,
                            id: quotation_id.to_string(),
                        })
                    })?;
                    let mut quotation: Quotation = decode(quotation_id, &current).map_err(abort)?;

                    if !quotation.is_approved() {
                        return Err(abort(LifecycleError::NotApproved {
                            kind: Quotation::KIND,
                            id: quotation_id.to_string(),
                        }));
                    }
                    if quotation.is_contractified() {
                        return Err(abort(LifecycleError::AlreadyConverted(
                            quotation_id.to_string(),
                        )));
                    }

                    let mut contract = Contract::from_quotation(&quotation, os);
                    contract.assign_id(contract_id.clone());
                    quotation.mark_contractified();

                    quotations.insert(
                        quotation_id.as_bytes(),
                        encode(&quotation).map_err(abort)?,
                    )?;
                    contracts.insert(contract_id.as_bytes(), encode(&contract).map_err(abort)?)?;
                    Ok(contract)
                },
            );

        let contract = settle(result, &format!("converting quotation {quotation_id}"))?;
        info!(quotation_id, contract_id = contract.id(), "quotation converted");
        Ok(contract)
    }

    /// Pre-delete check: everything deleting through `filter` would remove,
    /// or `None` when it matches no document.
    pub fn on_before_delete<D: Cascade>(&self, filter: &DeleteFilter) -> Result<Option<DeletionPlan>> {
        CascadeDeleter::new(&self.store).collect::<D>(filter)
    }

    /// Delete a root document and everything it owns
    #[instrument(skip(self))]
    pub fn delete<D: Cascade>(&self, filter: &DeleteFilter) -> Result<DeletionPlan> {
        CascadeDeleter::new(&self.store).delete::<D>(filter)
    }

    fn require<D: RootDocument>(&self, id: &str) -> Result<D> {
        self.get::<D>(id)?.ok_or_else(|| LifecycleError::NotFound {
            kind: D::KIND,
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> DocumentService {
        let db = sled::Config::new().temporary(true).open().unwrap();
        DocumentService::new(Arc::new(db)).unwrap()
    }

    #[test]
    fn numbered_drafts_are_rejected() {
        let service = service();
        let mut draft = Quotation::new();
        draft.approve_with("EPPL/ATT/QTN/2024-25/9".into(), TimeStamp::new());

        let err = service.create_quotation(draft.clone()).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidDraft { .. }));
        let err = service
            .import_approved(draft, "EPPL/ATT/QTN/2024-25/9", Utc::now())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidDraft { .. }));
        assert!(service.store().quotations.is_empty());
    }

    #[test]
    fn owned_records_touch_their_owner() {
        let service = service();
        let contract = service.create_contract(Contract::new()).unwrap();

        let summary = service
            .record_work_log_summary(contract.id(), WorkLogSummary::new(10, false))
            .unwrap();
        let again = service
            .record_work_log_summary(contract.id(), WorkLogSummary::new(25, true))
            .unwrap();
        assert_eq!(summary.id(), again.id());
        assert_eq!(summary.contract_id(), contract.id());

        let stored = service.get::<Contract>(contract.id()).unwrap().unwrap();
        assert!(stored.updated_at() >= contract.updated_at());
        assert_eq!(
            service.store().work_log_summaries.get(again.id()).unwrap(),
            Some(again)
        );
    }
}
