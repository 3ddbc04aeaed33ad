//! Persistent resource record storage.
//!
//! Records are kept in a flat key/value namespace. Keys come from the
//! [key codec][crate::keys::derive_key], values are [`StoredRecord`]s holding the record in its
//! presentation form and an optional expiry.
//!
//! Two implementations are provided, [`memory::InMemoryRecordStore`] and
//! [`redb_store::RedbRecordStore`]. The former is not durable across restarts and is meant for
//! tests. The latter keeps every record in a single-file [redb] database, one transaction per
//! operation.
//!
//! [redb]: https://www.redb.org

use crate::error::Error;
use crate::record::ResourceRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub mod memory;
pub mod redb_store;

#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryRecordStore;
#[allow(clippy::module_name_repetitions)]
pub use redb_store::RedbRecordStore;

/// `DynRecordStore` is a type alias for a [`RecordStore`] shared by the DNS engine, the reaper
/// and the HTTP API. Implementations do their own locking.
#[allow(clippy::module_name_repetitions)]
pub type DynRecordStore = Arc<dyn RecordStore>;

/// A record as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Regenerated on every write. Only used to tell writes apart in logs.
    pub id: String,
    /// The record in presentation form, e.g. `host.example.com. 300 IN A 10.0.0.1`.
    pub rr: String,
    /// Unix timestamp after which the reaper removes the record. Zero never expires.
    pub expires: i64,
}

impl StoredRecord {
    #[must_use]
    pub fn new(rr: &ResourceRecord, expires: i64) -> Self {
        StoredRecord {
            id: new_id(),
            rr: rr.to_string(),
            expires,
        }
    }

    /// Parse the stored presentation form back into a record kept under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecord`] naming `key` if the stored text isn't a valid record.
    pub fn record(&self, key: &str) -> Result<ResourceRecord, Error> {
        self.rr.parse().map_err(|err: Error| Error::CorruptRecord {
            key: key.to_string(),
            reason: err.to_string(),
        })
    }

    /// True when the record has an expiry and it has passed at `now`.
    #[must_use]
    pub fn expired_at(&self, now: i64) -> bool {
        self.expires != 0 && self.expires <= now
    }
}

pub(crate) fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// An async trait describing durable storage of [`StoredRecord`]s by key.
///
/// Every operation is its own transaction: readers never observe a partially applied write, and
/// concurrent writers to the same key resolve last-write-wins.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or overwrite the record stored under `key`. The record's `id` is regenerated.
    async fn put(&self, key: &str, record: StoredRecord) -> Result<(), Error>;

    /// Fetch the record stored under `key`, or [`Error::NotFound`].
    async fn get(&self, key: &str) -> Result<StoredRecord, Error>;

    /// Remove the record stored under `key`. Removing an absent key is [`Error::NotFound`].
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Keys of every record whose expiry is set and not after `now`.
    ///
    /// The keys are collected in a single read before being returned, callers are free to delete
    /// them while consuming the iterator.
    async fn list_expired(
        &self,
        now: i64,
    ) -> Result<Box<dyn Iterator<Item = String> + Send>, Error>;
}
