//! Embedded, durable key-value storage built on redb.
//!
//! A [`Store`] holds one database file made of named [`Collection`]s. Every
//! collection maps byte keys to byte values and iterates in key order. Each
//! collection also owns a monotonic sequence counter, kept in a separate
//! table and written in the same transaction as the records it numbers.
//!
//! Transactions are scoped guards:
//!
//! - [`ReadTxn`] sees a consistent snapshot. Any number may be open at once.
//! - [`WriteTxn`] has exclusive write access. Only [`WriteTxn::commit`] makes
//!   its effects visible; dropping the guard for any other reason (an early
//!   `?` return, a panic unwinding through the caller) rolls everything back.
//!
//! [`Store::view`] and [`Store::update`] wrap that pattern for the common case
//! of running a single operation inside one transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info, warn};

/// Sequence counters, one per collection, keyed by collection name.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open store at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: redb::DatabaseError,
    },
    #[error("failed to begin transaction: {0}")]
    Transaction(#[from] redb::TransactionError),
    #[error("failed to open collection: {0}")]
    Table(#[from] redb::TableError),
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("failed to commit transaction: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("failed to roll back transaction: {0}")]
    Rollback(#[source] redb::StorageError),
    #[error("sequence for collection {0} is exhausted")]
    SequenceExhausted(&'static str),
    #[error("malformed key of {len} bytes in collection {collection}")]
    MalformedKey { collection: &'static str, len: usize },
    #[error("transaction already finished")]
    Finished,
    #[error("store is closed")]
    Closed,
}

/// A named group of key-value pairs inside a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    name: &'static str,
}

impl Collection {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn table(self) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
        TableDefinition::new(self.name)
    }
}

/// Handle to an open database file.
///
/// The handle is shared by every request; redb serializes writers and lets
/// readers proceed against snapshots, so no extra locking happens here beyond
/// guarding the open/closed state.
pub struct Store {
    path: PathBuf,
    db: RwLock<Option<Arc<Database>>>,
}

impl Store {
    /// Opens the database at `path`, creating the file if needed, and makes
    /// sure every collection in `collections` exists.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        collections: &[Collection],
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        let store = Self {
            path,
            db: RwLock::new(Some(Arc::new(db))),
        };

        let mut txn = store.begin_write()?;
        for collection in collections {
            txn.ensure(*collection)?;
        }
        txn.commit()?;

        info!(path = %store.path.display(), "store opened");
        Ok(store)
    }

    /// Releases the database. Later operations fail with [`StoreError::Closed`].
    ///
    /// Transactions already in flight keep the file open until they finish.
    pub fn close(&self) {
        if self.db.write().take().is_some() {
            info!(path = %self.path.display(), "store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    fn handle(&self) -> Result<Arc<Database>, StoreError> {
        self.db.read().as_ref().map(Arc::clone).ok_or(StoreError::Closed)
    }

    pub fn begin_read(&self) -> Result<ReadTxn, StoreError> {
        let db = self.handle()?;
        Ok(ReadTxn {
            inner: db.begin_read()?,
        })
    }

    /// Starts a write transaction, waiting for any active writer to finish.
    pub fn begin_write(&self) -> Result<WriteTxn, StoreError> {
        let db = self.handle()?;
        Ok(WriteTxn {
            inner: Some(db.begin_write()?),
        })
    }

    /// Runs `op` against a read snapshot.
    pub fn view<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&ReadTxn) -> Result<T, E>,
    {
        let txn = self.begin_read()?;
        op(&txn)
    }

    /// Runs `op` inside a write transaction, committing only if it succeeds.
    pub fn update<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut WriteTxn) -> Result<T, E>,
    {
        let mut txn = self.begin_write()?;
        let value = op(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }
}

/// Read-only snapshot of the store.
pub struct ReadTxn {
    inner: redb::ReadTransaction,
}

impl ReadTxn {
    pub fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let table = self.inner.open_table(collection.table())?;
        let value = table.get(key)?.map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// Visits every entry of `collection` in ascending key order.
    pub fn scan<E, F>(&self, collection: Collection, mut visit: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        let table = self
            .inner
            .open_table(collection.table())
            .map_err(StoreError::from)?;
        for entry in table.iter().map_err(StoreError::from)? {
            let (key, value) = entry.map_err(StoreError::from)?;
            visit(key.value(), value.value())?;
        }
        Ok(())
    }

    /// Last value handed out by the collection's sequence, 0 if none yet.
    pub fn sequence(&self, collection: Collection) -> Result<u64, StoreError> {
        let table = self.inner.open_table(SEQUENCES)?;
        let current = table.get(collection.name())?.map(|guard| guard.value());
        Ok(current.unwrap_or(0))
    }
}

/// Exclusive write access to the store.
pub struct WriteTxn {
    inner: Option<redb::WriteTransaction>,
}

impl WriteTxn {
    fn txn(&self) -> Result<&redb::WriteTransaction, StoreError> {
        self.inner.as_ref().ok_or(StoreError::Finished)
    }

    fn ensure(&mut self, collection: Collection) -> Result<(), StoreError> {
        let txn = self.txn()?;
        txn.open_table(collection.table())?;
        txn.open_table(SEQUENCES)?;
        Ok(())
    }

    pub fn get(&self, collection: Collection, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let table = self.txn()?.open_table(collection.table())?;
        let value = table.get(key)?.map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&mut self, collection: Collection, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut table = self.txn()?.open_table(collection.table())?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Removes `key`, reporting whether it was present.
    pub fn delete(&mut self, collection: Collection, key: &[u8]) -> Result<bool, StoreError> {
        let mut table = self.txn()?.open_table(collection.table())?;
        let removed = table.remove(key)?.is_some();
        Ok(removed)
    }

    /// Advances the collection's sequence and returns the new value.
    ///
    /// The first value handed out is 1. Values are never reused, regardless
    /// of how many entries are later removed.
    pub fn next_sequence(&mut self, collection: Collection) -> Result<u64, StoreError> {
        let mut table = self.txn()?.open_table(SEQUENCES)?;
        let current = table.get(collection.name())?.map(|guard| guard.value());
        let next = current
            .unwrap_or(0)
            .checked_add(1)
            .ok_or(StoreError::SequenceExhausted(collection.name()))?;
        table.insert(collection.name(), next)?;
        Ok(next)
    }

    /// Durably commits every change made through this transaction.
    pub fn commit(mut self) -> Result<(), StoreError> {
        let txn = self.inner.take().ok_or(StoreError::Finished)?;
        txn.commit()?;
        Ok(())
    }

    /// Discards every change made through this transaction.
    pub fn rollback(mut self) -> Result<(), StoreError> {
        let txn = self.inner.take().ok_or(StoreError::Finished)?;
        txn.abort().map_err(StoreError::Rollback)
    }
}

impl Drop for WriteTxn {
    fn drop(&mut self) {
        if let Some(txn) = self.inner.take() {
            debug!("rolling back uncommitted write transaction");
            if let Err(err) = txn.abort().map_err(StoreError::Rollback) {
                warn!(error = %err, "dropped write transaction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::*;

    const NOTES: Collection = Collection::new("notes");

    fn open(dir: &tempfile::TempDir) -> Store {
        Store::open_or_create(dir.path().join("store.db"), &[NOTES]).expect("open store")
    }

    fn read(store: &Store, key: &[u8]) -> Option<Vec<u8>> {
        store
            .view(|txn| txn.get(NOTES, key))
            .expect("read transaction")
    }

    #[test]
    fn commit_makes_writes_visible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);

        let mut txn = store.begin_write().expect("begin write");
        txn.put(NOTES, b"a", b"1").expect("put");
        assert_eq!(txn.get(NOTES, b"a").expect("get"), Some(b"1".to_vec()));
        txn.commit().expect("commit");

        assert_eq!(read(&store, b"a"), Some(b"1".to_vec()));
    }

    #[test]
    fn failed_update_rolls_back_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);

        let result = store.update(|txn| {
            txn.next_sequence(NOTES)?;
            txn.put(NOTES, b"a", b"1")?;
            Err::<(), _>(StoreError::Closed)
        });
        assert!(matches!(result, Err(StoreError::Closed)));

        assert_eq!(read(&store, b"a"), None);
        let sequence = store.view(|txn| txn.sequence(NOTES)).expect("sequence");
        assert_eq!(sequence, 0);
    }

    #[test]
    fn panic_inside_update_rolls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            store.update::<(), StoreError, _>(|txn| {
                txn.put(NOTES, b"a", b"1")?;
                panic!("writer blew up");
            })
        }));
        assert!(outcome.is_err());

        assert_eq!(read(&store, b"a"), None);
        store
            .update(|txn| txn.put(NOTES, b"b", b"2"))
            .expect("store still accepts writers");
    }

    #[test]
    fn explicit_rollback_discards_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);

        let mut txn = store.begin_write().expect("begin write");
        txn.put(NOTES, b"a", b"1").expect("put");
        txn.rollback().expect("rollback");

        assert_eq!(read(&store, b"a"), None);
    }

    #[test]
    fn rollback_failures_keep_their_own_kind() {
        let err = StoreError::Rollback(redb::StorageError::Corrupted("torn page".into()));
        assert!(err.to_string().starts_with("failed to roll back transaction"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn sequence_is_monotonic_and_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);
        let first = store.update(|txn| txn.next_sequence(NOTES)).expect("seq");
        let second = store.update(|txn| txn.next_sequence(NOTES)).expect("seq");
        assert_eq!((first, second), (1, 2));
        store.close();

        let store = open(&dir);
        let third = store.update(|txn| txn.next_sequence(NOTES)).expect("seq");
        assert_eq!(third, 3);
    }

    #[test]
    fn scan_visits_keys_in_byte_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);
        store
            .update(|txn| {
                for key in [&b"c"[..], b"a", b"b"] {
                    txn.put(NOTES, key, b"x")?;
                }
                Ok::<_, StoreError>(())
            })
            .expect("writes");

        let mut keys = Vec::new();
        store
            .view(|txn| {
                txn.scan(NOTES, |key, _| {
                    keys.push(key.to_vec());
                    Ok::<_, StoreError>(())
                })
            })
            .expect("scan");
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn snapshot_ignores_later_commits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);

        let snapshot = store.begin_read().expect("begin read");
        store
            .update(|txn| txn.put(NOTES, b"a", b"1"))
            .expect("write");

        assert_eq!(snapshot.get(NOTES, b"a").expect("get"), None);
        assert_eq!(read(&store, b"a"), Some(b"1".to_vec()));
    }

    #[test]
    fn delete_reports_presence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);
        store
            .update(|txn| txn.put(NOTES, b"a", b"1"))
            .expect("write");

        assert!(store.update(|txn| txn.delete(NOTES, b"a")).expect("delete"));
        assert!(!store.update(|txn| txn.delete(NOTES, b"a")).expect("delete"));
    }

    #[test]
    fn operations_fail_after_close() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir);
        store.close();
        store.close();

        assert!(store.is_closed());
        assert!(matches!(store.begin_read(), Err(StoreError::Closed)));
        assert!(matches!(store.begin_write(), Err(StoreError::Closed)));
    }
}
