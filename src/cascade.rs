//! Cascading deletion of root documents and everything they own
//!
//! Deletion runs in two phases. [`CascadeDeleter::prepare`] resolves the
//! filter to a document and gathers the ids of every dependent record into a
//! [`DeletionPlan`]. [`CascadeDeleter::execute`] then removes the whole plan,
//! root included, in one transaction across all collections, so a failure
//! leaves every record in place.
use super::document::{Contract, DocumentKind, Quotation, RootDocument};
use super::error::{LifecycleError, Result};
use super::store::{Record, Store, decode, settle};
use sled::IVec;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionResult,
    TransactionalTree,
};
use sled::Transactional;
use tracing::{debug, info};

/// Selects the root document a deletion applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteFilter {
    Id(String),
    Number(String),
}

impl DeleteFilter {
    pub fn id(id: &str) -> Self {
        Self::Id(id.to_string())
    }
    pub fn number(number: &str) -> Self {
        Self::Number(number.to_string())
    }
}

/// Ids of every record one deletion removes, per collection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    pub quotations: Vec<String>,
    pub contracts: Vec<String>,
    pub line_items: Vec<String>,
    pub delivery_records: Vec<String>,
    pub work_logs: Vec<String>,
    pub work_log_summaries: Vec<String>,
    pub archives: Vec<String>,
}

impl DeletionPlan {
    pub fn len(&self) -> usize {
        self.quotations.len()
            + self.contracts.len()
            + self.line_items.len()
            + self.delivery_records.len()
            + self.work_logs.len()
            + self.work_log_summaries.len()
            + self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn add<I, S>(ids: &mut Vec<String>, new: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for id in new {
        let id = id.as_ref();
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
}

/// A root document read while collecting, with the bytes it had then.
#[derive(Debug, Clone)]
struct Snapshot {
    kind: DocumentKind,
    id: String,
    bytes: IVec,
}

/// A collected deletion waiting to be applied.
///
/// Besides the plan it keeps a snapshot of every root document the plan was
/// derived from: the document being deleted and, for a contract, its
/// originating quotation. Applying aborts if any of them changed since.
#[derive(Debug, Clone)]
pub struct PreparedDeletion {
    kind: DocumentKind,
    root_id: String,
    plan: DeletionPlan,
    snapshots: Vec<Snapshot>,
}

impl PreparedDeletion {
    pub fn root_id(&self) -> &str {
        &self.root_id
    }
    pub fn plan(&self) -> &DeletionPlan {
        &self.plan
    }
}

/// A root document that knows which records it owns.
pub trait Cascade: RootDocument {
    /// Adds this document and everything it owns to `deletion`.
    fn collect_dependents(&self, store: &Store, deletion: &mut PreparedDeletion) -> Result<()>;
}

impl Cascade for Quotation {
    fn collect_dependents(&self, store: &Store, deletion: &mut PreparedDeletion) -> Result<()> {
        let plan = &mut deletion.plan;
        add(&mut plan.line_items, self.line_items());

        // archives point back by id; older ones only carry the quotation number
        let number = self.number();
        let archives = store.archives.filter(|archive| {
            archive.quotation_id() == Some(self.id())
                || (archive.contract_id().is_none()
                    && number.is_some()
                    && archive.number() == number)
        })?;
        add(&mut plan.archives, archives.iter().map(|a| a.id()));

        add(&mut plan.quotations, [self.id()]);
        Ok(())
    }
}

impl Cascade for Contract {
    fn collect_dependents(&self, store: &Store, deletion: &mut PreparedDeletion) -> Result<()> {
        let plan = &mut deletion.plan;
        add(&mut plan.line_items, self.line_items());
        add(&mut plan.delivery_records, self.delivery_records());
        add(&mut plan.work_logs, self.work_logs());

        let archives = store
            .archives
            .filter(|archive| archive.contract_id() == Some(self.id()))?;
        add(&mut plan.archives, archives.iter().map(|a| a.id()));

        let summaries = store
            .work_log_summaries
            .filter(|summary| summary.contract_id() == self.id())?;
        add(&mut plan.work_log_summaries, summaries.iter().map(|s| s.id()));

        // the originating quotation goes too, with its own dependents
        if let Some(quotation_id) = self.quotation() {
            match store.quotations.get_raw(quotation_id)? {
                Some(bytes) => {
                    let quotation: Quotation = decode(quotation_id, &bytes)?;
                    deletion.snapshots.push(Snapshot {
                        kind: DocumentKind::Quotation,
                        id: quotation_id.to_string(),
                        bytes,
                    });
                    quotation.collect_dependents(store, deletion)?;
                }
                None => debug!(contract = self.id(), quotation_id, "originating quotation already gone"),
            }
        }

        add(&mut deletion.plan.contracts, [self.id()]);
        Ok(())
    }
}

pub struct CascadeDeleter<'a> {
    store: &'a Store,
}

impl<'a> CascadeDeleter<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// The document `filter` selects, if any.
    pub fn lookup<D: Cascade>(&self, filter: &DeleteFilter) -> Result<Option<D>> {
        Ok(self.lookup_raw::<D>(filter)?.map(|(doc, _)| doc))
    }

    fn lookup_raw<D: Cascade>(&self, filter: &DeleteFilter) -> Result<Option<(D, IVec)>> {
        let collection = D::collection(self.store);
        match filter {
            DeleteFilter::Id(id) => collection
                .get_raw(id)?
                .map(|bytes| decode::<D>(id, &bytes).map(|doc| (doc, bytes)))
                .transpose(),
            DeleteFilter::Number(number) => {
                collection.find_raw(|doc| doc.number() == Some(number.as_str()))
            }
        }
    }

    /// Collects everything a deletion through `filter` would remove, without
    /// removing anything. `None` when the filter matches nothing.
    pub fn prepare<D: Cascade>(&self, filter: &DeleteFilter) -> Result<Option<PreparedDeletion>> {
        let Some((root, bytes)) = self.lookup_raw::<D>(filter)? else {
            return Ok(None);
        };
        let mut deletion = PreparedDeletion {
            kind: D::KIND,
            root_id: root.id().to_string(),
            plan: DeletionPlan::default(),
            snapshots: vec![Snapshot {
                kind: D::KIND,
                id: root.id().to_string(),
                bytes,
            }],
        };
        root.collect_dependents(self.store, &mut deletion)?;
        Ok(Some(deletion))
    }

    /// Pre-delete phase: the plan of [`prepare`](Self::prepare) on its own.
    pub fn collect<D: Cascade>(&self, filter: &DeleteFilter) -> Result<Option<DeletionPlan>> {
        Ok(self.prepare::<D>(filter)?.map(|prepared| prepared.plan))
    }

    /// Deletes the selected document and its dependents, returning what was
    /// removed. A filter matching nothing is not an error and removes nothing.
    pub fn delete<D: Cascade>(&self, filter: &DeleteFilter) -> Result<DeletionPlan> {
        match self.prepare::<D>(filter)? {
            Some(prepared) => self.execute(prepared),
            None => {
                let kind = D::KIND;
                debug!(%kind, ?filter, "delete matched nothing");
                Ok(DeletionPlan::default())
            }
        }
    }

    /// Applies a prepared deletion in one transaction.
    ///
    /// Fails with [`LifecycleError::ConcurrentModification`] and removes
    /// nothing when a snapshotted document changed after it was prepared.
    pub fn execute(&self, prepared: PreparedDeletion) -> Result<DeletionPlan> {
        self.apply(&prepared)?;
        let kind = prepared.kind;
        info!(
            %kind,
            id = %prepared.root_id,
            removed = prepared.plan.len(),
            "cascade delete complete"
        );
        Ok(prepared.plan)
    }

    fn apply(&self, prepared: &PreparedDeletion) -> Result<()> {
        let store = self.store;
        let plan = &prepared.plan;

        let result: TransactionResult<(), LifecycleError> = (
            store.quotations.tree(),
            store.contracts.tree(),
            store.line_items.tree(),
            store.delivery_records.tree(),
            store.work_logs.tree(),
            store.work_log_summaries.tree(),
            store.archives.tree(),
        )
            .transaction(
                |(quotations, contracts, line_items, delivery_records, work_logs, summaries, archives)| {
                    for snapshot in &prepared.snapshots {
                        let roots = match snapshot.kind {
                            DocumentKind::Quotation => quotations,
                            _ => contracts,
                        };
                        let current = roots.get(snapshot.id.as_bytes())?;
                        if current.as_ref() != Some(&snapshot.bytes) {
                            return Err(ConflictableTransactionError::Abort(
                                LifecycleError::ConcurrentModification {
                                    kind: snapshot.kind,
                                    id: snapshot.id.clone(),
                                    step: "collecting dependents for deletion",
                                },
                            ));
                        }
                    }

                    // dependents first, owners last
                    remove_all(line_items, &plan.line_items)?;
                    remove_all(delivery_records, &plan.delivery_records)?;
                    remove_all(work_logs, &plan.work_logs)?;
                    remove_all(summaries, &plan.work_log_summaries)?;
                    remove_all(archives, &plan.archives)?;
                    remove_all(quotations, &plan.quotations)?;
                    remove_all(contracts, &plan.contracts)?;
                    Ok(())
                },
            );

        settle(
            result,
            &format!("deleting {} {} and its dependents", prepared.kind, prepared.root_id),
        )
    }
}

fn remove_all(
    tree: &TransactionalTree,
    ids: &[String],
) -> ConflictableTransactionResult<(), LifecycleError> {
    for id in ids {
        tree.remove(id.as_bytes())?;
    }
    Ok(())
}
