//! Domain operations on shouts.
//!
//! Every call runs in exactly one store transaction and re-reads from the
//! store; nothing is cached in process.

use std::path::Path;

use tracing::debug;

use crate::error::ShoutError;
use crate::keys::{id_from_slice, id_to_key};
use crate::shout::Shout;
use crate::store::{Collection, Store, StoreError};

/// Collection holding every shout, keyed by big-endian id.
pub const SHOUTS: Collection = Collection::new("shouts");

pub struct ShoutRepository {
    store: Store,
}

impl ShoutRepository {
    /// Opens (or creates) the store file at `path` with the shouts collection.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ShoutError> {
        let store = Store::open_or_create(path, &[SHOUTS])?;
        Ok(Self { store })
    }

    pub fn close(&self) {
        self.store.close();
    }

    /// Stores a new shout and returns the id assigned to it.
    pub fn save(&self, user: &str, message: &str) -> Result<u64, ShoutError> {
        let id = self.store.update(|txn| {
            // Updates may have created ids ahead of the sequence.
            let mut id = txn.next_sequence(SHOUTS)?;
            while txn.get(SHOUTS, &id_to_key(id))?.is_some() {
                id = txn.next_sequence(SHOUTS)?;
            }
            let shout = Shout::new(id, user, message);
            txn.put(SHOUTS, &id_to_key(id), &shout.encode()?)?;
            Ok::<_, ShoutError>(id)
        })?;
        debug!(id, user, "saved shout");
        Ok(id)
    }

    /// Overwrites the shout stored under `id` with a freshly stamped record.
    ///
    /// Behaves as an upsert: a missing id is created in place. The sequence
    /// is left alone; [`save`](Self::save) steps over ids already taken.
    pub fn update(&self, id: u64, user: &str, message: &str) -> Result<u64, ShoutError> {
        if id == 0 {
            return Err(ShoutError::InvalidId(id.to_string()));
        }
        self.store.update(|txn| {
            let shout = Shout::new(id, user, message);
            txn.put(SHOUTS, &id_to_key(id), &shout.encode()?)?;
            Ok::<_, ShoutError>(())
        })?;
        debug!(id, user, "updated shout");
        Ok(id)
    }

    pub fn get(&self, id: u64) -> Result<Shout, ShoutError> {
        let raw = self
            .store
            .view(|txn| txn.get(SHOUTS, &id_to_key(id)))?
            .ok_or(ShoutError::NotFound(id))?;
        Ok(Shout::decode(&raw)?)
    }

    /// Ids of every live shout in ascending order.
    pub fn list(&self) -> Result<Vec<u64>, ShoutError> {
        self.store.view(|txn| {
            let mut ids = Vec::new();
            txn.scan(SHOUTS, |key, _| {
                let id = id_from_slice(key).ok_or(StoreError::MalformedKey {
                    collection: SHOUTS.name(),
                    len: key.len(),
                })?;
                ids.push(id);
                Ok::<_, ShoutError>(())
            })?;
            Ok(ids)
        })
    }

    /// Removes the shout stored under `id`. Removing a missing id succeeds.
    pub fn delete(&self, id: u64) -> Result<u64, ShoutError> {
        let existed = self
            .store
            .update(|txn| txn.delete(SHOUTS, &id_to_key(id)))?;
        debug!(id, existed, "deleted shout");
        Ok(id)
    }
}
