//! Typed collections over sled trees
use super::document::{Contract, DocumentKind, Quotation};
use super::error::{LifecycleError, Result, StoreContext};
use super::records::{ArchiveRecord, DeliveryRecord, LineItem, WorkLogEntry, WorkLogSummary};
use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, IVec, Tree};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Anything stored in a collection, keyed by its own bech32 id.
pub trait Record: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    const KIND: DocumentKind;
    /// Human readable part of generated ids.
    const ID_PREFIX: &'static str;

    fn id(&self) -> &str;
    fn assign_id(&mut self, id: String);
}

pub(crate) fn encode<T: Record>(record: &T) -> Result<Vec<u8>> {
    minicbor::to_vec(record).map_err(|source| LifecycleError::Encode {
        kind: T::KIND,
        id: record.id().to_string(),
        source,
    })
}

pub(crate) fn decode<T: Record>(id: &str, bytes: &[u8]) -> Result<T> {
    minicbor::decode(bytes).map_err(|source| LifecycleError::Decode {
        kind: T::KIND,
        id: id.to_string(),
        source,
    })
}

/// Folds a multi-tree transaction result back into a [`LifecycleError`].
pub(crate) fn settle<T>(result: TransactionResult<T, LifecycleError>, step: &str) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(source)) => Err(LifecycleError::StoreFailure {
            step: step.to_string(),
            source,
        }),
    }
}

pub struct Collection<T> {
    tree: Tree,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Collection<T> {
    fn open(db: &Db, name: &str) -> Result<Self> {
        let tree = db
            .open_tree(name)
            .during(|| format!("opening the {name} tree"))?;
        Ok(Self {
            tree,
            _record: PhantomData,
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        self.tree
            .contains_key(id)
            .during(|| format!("checking {} {id}", T::KIND))
    }

    pub fn get(&self, id: &str) -> Result<Option<T>> {
        self.get_raw(id)?
            .map(|bytes| decode(id, &bytes))
            .transpose()
    }

    pub(crate) fn get_raw(&self, id: &str) -> Result<Option<IVec>> {
        self.tree
            .get(id)
            .during(|| format!("loading {} {id}", T::KIND))
    }

    /// Full-document save.
    pub fn insert(&self, record: &T) -> Result<()> {
        let bytes = encode(record)?;
        self.tree
            .insert(record.id(), bytes)
            .during(|| format!("saving {} {}", T::KIND, record.id()))?;
        Ok(())
    }

    /// First record matching `predicate`, in key order.
    pub fn find<P: Fn(&T) -> bool>(&self, predicate: P) -> Result<Option<T>> {
        Ok(self.find_raw(predicate)?.map(|(record, _)| record))
    }

    pub(crate) fn find_raw<P: Fn(&T) -> bool>(&self, predicate: P) -> Result<Option<(T, IVec)>> {
        for entry in self.tree.iter() {
            let (key, bytes) = entry.during(|| format!("scanning {} records", T::KIND))?;
            let record: T = decode(&String::from_utf8_lossy(&key), &bytes)?;
            if predicate(&record) {
                return Ok(Some((record, bytes)));
            }
        }
        Ok(None)
    }

    pub fn filter<P: Fn(&T) -> bool>(&self, predicate: P) -> Result<Vec<T>> {
        let mut matches = vec![];
        for entry in self.tree.iter() {
            let (key, bytes) = entry.during(|| format!("scanning {} records", T::KIND))?;
            let record: T = decode(&String::from_utf8_lossy(&key), &bytes)?;
            if predicate(&record) {
                matches.push(record);
            }
        }
        Ok(matches)
    }

    /// Read-modify-write of one record as a compare-and-swap.
    ///
    /// `mutate` returns whether it changed the record. On a conflicting
    /// concurrent write the record is reloaded and `mutate` runs again.
    pub fn update<F>(&self, id: &str, mut mutate: F) -> Result<T>
    where
        F: FnMut(&mut T) -> Result<bool>,
    {
        loop {
            let current = self.get_raw(id)?.ok_or_else(|| LifecycleError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            })?;
            let mut record: T = decode(id, &current)?;
            if !mutate(&mut record)? {
                return Ok(record);
            }

            let swapped = self
                .tree
                .compare_and_swap(id, Some(&current), Some(encode(&record)?))
                .during(|| format!("saving {} {id}", T::KIND))?;
            match swapped {
                Ok(()) => return Ok(record),
                Err(_) => debug!(id, "concurrent write to {}, retrying update", T::KIND),
            }
        }
    }
}

/// All collections the engine reads and writes.
pub struct Store {
    db: Arc<Db>,
    pub quotations: Collection<Quotation>,
    pub contracts: Collection<Contract>,
    pub line_items: Collection<LineItem>,
    pub delivery_records: Collection<DeliveryRecord>,
    pub work_logs: Collection<WorkLogEntry>,
    pub work_log_summaries: Collection<WorkLogSummary>,
    pub archives: Collection<ArchiveRecord>,
}

impl Store {
    pub fn open(db: Arc<Db>) -> Result<Self> {
        Ok(Self {
            quotations: Collection::open(&db, "quotations")?,
            contracts: Collection::open(&db, "contracts")?,
            line_items: Collection::open(&db, "line_items")?,
            delivery_records: Collection::open(&db, "delivery_records")?,
            work_logs: Collection::open(&db, "work_logs")?,
            work_log_summaries: Collection::open(&db, "work_log_summaries")?,
            archives: Collection::open(&db, "archives")?,
            db,
        })
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    pub fn flush(&self) -> Result<usize> {
        self.db.flush().during(|| "flushing the database".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Store::open(Arc::new(db)).unwrap()
    }

    fn item(id: &str, description: &str) -> LineItem {
        let mut item = LineItem::new(description, 1, 100);
        item.assign_id(id.to_string());
        item
    }

    #[test]
    fn insert_get_and_find() {
        let store = store();
        store.line_items.insert(&item("item_a", "spray")).unwrap();
        store.line_items.insert(&item("item_b", "drill")).unwrap();

        assert_eq!(store.line_items.len(), 2);
        assert_eq!(
            store.line_items.get("item_a").unwrap().unwrap().description,
            "spray"
        );
        let found = store
            .line_items
            .find(|i| i.description == "drill")
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), "item_b");
        assert!(store.line_items.get("item_c").unwrap().is_none());
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let store = store();
        let err = store.line_items.update("nope", |_| Ok(true)).unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { .. }));
    }

    #[test]
    fn update_without_change_does_not_write() {
        let store = store();
        store.line_items.insert(&item("item_a", "spray")).unwrap();
        let unchanged = store
            .line_items
            .update("item_a", |i| {
                i.quantity = 99;
                Ok(false)
            })
            .unwrap();
        // the returned copy was mutated but nothing was persisted
        assert_eq!(unchanged.quantity, 99);
        assert_eq!(store.line_items.get("item_a").unwrap().unwrap().quantity, 1);
    }

    #[test]
    fn corrupt_bytes_surface_as_decode_errors() {
        let store = store();
        store.line_items.tree().insert("item_x", &[0xff, 0x00][..]).unwrap();
        let err = store.line_items.get("item_x").unwrap_err();
        assert!(matches!(err, LifecycleError::Decode { .. }));
    }
}
