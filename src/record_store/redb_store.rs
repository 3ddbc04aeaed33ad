//! A [redb]-backed implementation of the [`RecordStore`][super::RecordStore] trait.
//!
//! All records live in the `rr` table of a single database file, keyed by storage key, with the
//! JSON encoded [`StoredRecord`][super::StoredRecord] as value. redb allows one writer and any
//! number of MVCC readers, so lookups never wait on updates and never observe a half-written
//! record.
//!
//! [redb]: https://www.redb.org
use crate::error::Error;
use crate::record_store::{new_id, RecordStore, StoredRecord};
use lazy_static::lazy_static;
use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::time::Instant;

const RR_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("rr");

const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(100);

lazy_static! {
    // Databases opened by this process, so that connecting twice to one path shares the handle
    // instead of failing on redb's file lock.
    static ref OPEN_DATABASES: Mutex<HashMap<PathBuf, Weak<Database>>> =
        Mutex::new(HashMap::new());
}

/// A durable record store kept in a single redb database file.
///
/// Cloning is cheap and every clone shares the same database handle.
/// [`disconnect`][RedbRecordStore::disconnect] closes it for all clones.
#[derive(Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct RedbRecordStore {
    path: PathBuf,
    db: Arc<RwLock<Option<Arc<Database>>>>,
}

impl RedbRecordStore {
    /// Open, or create if absent, the store at `path` and ensure the `rr` table exists.
    ///
    /// Connecting again to a path that is already open in this process reuses the open
    /// database. If another process holds the file, opening is retried until `open_timeout`
    /// has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the parent directory can't be created, [`Error::StoreTimeout`]
    /// if the database stays locked, or [`Error::Storage`] if it can't be opened or initialised.
    pub async fn connect(path: impl AsRef<Path>, open_timeout: Duration) -> Result<Self, Error> {
        let path = absolute_path(path.as_ref()).await?;
        let deadline = Instant::now() + open_timeout;

        let db = loop {
            if let Some(db) = registered(&path) {
                tracing::debug!("reusing open record store {}", path.display());
                break db;
            }
            match Database::create(&path) {
                Ok(db) => {
                    let db = Arc::new(db);
                    Self::init_tables(&db)?;
                    register(&path, &db);
                    tracing::debug!("opened record store {}", path.display());
                    break db;
                }
                Err(DatabaseError::DatabaseAlreadyOpen) if Instant::now() < deadline => {
                    tokio::time::sleep(OPEN_RETRY_INTERVAL).await;
                }
                Err(DatabaseError::DatabaseAlreadyOpen) => {
                    return Err(Error::StoreTimeout(path.display().to_string()));
                }
                Err(err) => return Err(err.into()),
            }
        };

        Ok(Self {
            path,
            db: Arc::new(RwLock::new(Some(db))),
        })
    }

    /// Release the database. Safe to call more than once; later operations fail with
    /// [`Error::StoreClosed`].
    pub fn disconnect(&self) {
        let db = self
            .db
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if db.is_some() {
            tracing::debug!("closed record store {}", self.path.display());
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_tables(db: &Database) -> Result<(), Error> {
        let txn = db.begin_write()?;
        txn.open_table(RR_TABLE)?;
        txn.commit()?;
        Ok(())
    }

    fn database(&self) -> Result<Arc<Database>, Error> {
        self.db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::StoreClosed)
    }
}

#[async_trait::async_trait]
impl RecordStore for RedbRecordStore {
    async fn put(&self, key: &str, mut record: StoredRecord) -> Result<(), Error> {
        record.id = new_id();
        tracing::debug!("set ID {} for {key}", record.id);
        let value = serde_json::to_vec(&record)?;

        let db = self.database()?;
        let txn = db.begin_write()?;
        {
            let mut table = txn.open_table(RR_TABLE)?;
            table.insert(key, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredRecord, Error> {
        let db = self.database()?;
        let txn = db.begin_read()?;
        let table = txn.open_table(RR_TABLE)?;
        let record = match table.get(key)? {
            Some(raw) => {
                serde_json::from_slice(raw.value()).map_err(|err| Error::CorruptRecord {
                    key: key.to_string(),
                    reason: err.to_string(),
                })?
            }
            None => return Err(Error::NotFound(key.to_string())),
        };
        Ok(record)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let db = self.database()?;
        let txn = db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(RR_TABLE)?;
            // NB: bound before `table` drops, the removed value borrows it.
            let removed = table.remove(key)?.is_some();
            removed
        };
        txn.commit()?;
        if removed {
            Ok(())
        } else {
            Err(Error::NotFound(key.to_string()))
        }
    }

    async fn list_expired(
        &self,
        now: i64,
    ) -> Result<Box<dyn Iterator<Item = String> + Send>, Error> {
        let db = self.database()?;
        let txn = db.begin_read()?;
        let table = txn.open_table(RR_TABLE)?;

        let mut expired = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            match serde_json::from_slice::<StoredRecord>(value.value()) {
                Ok(record) if record.expired_at(now) => expired.push(key.value().to_string()),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!("skipping undecodable record \"{}\": {err}", key.value());
                }
            }
        }
        Ok(Box::new(expired.into_iter()))
    }
}

async fn absolute_path(path: &Path) -> Result<PathBuf, Error> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(parent).await?;
    let file_name = path.file_name().ok_or_else(|| {
        Error::IO(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("record store path has no file name: {}", path.display()),
        ))
    })?;
    Ok(tokio::fs::canonicalize(parent).await?.join(file_name))
}

fn registered(path: &Path) -> Option<Arc<Database>> {
    OPEN_DATABASES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(path)
        .and_then(Weak::upgrade)
}

fn register(path: &Path, db: &Arc<Database>) {
    OPEN_DATABASES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(path.to_path_buf(), Arc::downgrade(db));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordData, ResourceRecord};
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn a_record(domain: &str, ip: &str, expires: i64) -> StoredRecord {
        let rr = ResourceRecord::new(domain, 60, RecordData::A(ip.parse().unwrap())).unwrap();
        StoredRecord::new(&rr, expires)
    }

    #[tokio::test]
    async fn put_then_get_returns_the_record() {
        let dir = tempdir().unwrap();
        let store = RedbRecordStore::connect(dir.path().join("ddns.db"), TIMEOUT)
            .await
            .unwrap();

        let record = a_record("host.example.com", "10.0.0.1", 0);
        store.put("com.example.host_1", record.clone()).await.unwrap();

        let fetched = store.get("com.example.host_1").await.unwrap();
        assert_eq!(fetched.rr, record.rr);
        assert_eq!(fetched.expires, 0);
        assert_ne!(fetched.id, record.id, "id is regenerated on write");
    }

    #[tokio::test]
    async fn put_overwrites_in_place() {
        let dir = tempdir().unwrap();
        let store = RedbRecordStore::connect(dir.path().join("ddns.db"), TIMEOUT)
            .await
            .unwrap();

        store
            .put("com.example.host_1", a_record("host.example.com", "10.0.0.1", 0))
            .await
            .unwrap();
        store
            .put("com.example.host_1", a_record("host.example.com", "10.0.0.2", 0))
            .await
            .unwrap();

        let fetched = store.get("com.example.host_1").await.unwrap();
        assert_eq!(fetched.rr, "host.example.com. 60 IN A 10.0.0.2");
    }

    #[tokio::test]
    async fn missing_keys_are_not_found() {
        let dir = tempdir().unwrap();
        let store = RedbRecordStore::connect(dir.path().join("ddns.db"), TIMEOUT)
            .await
            .unwrap();

        assert!(store.get("com.example.nope_1").await.unwrap_err().is_not_found());

        store
            .put("com.example.host_1", a_record("host.example.com", "10.0.0.1", 0))
            .await
            .unwrap();
        store.delete("com.example.host_1").await.unwrap();
        assert!(store
            .delete("com.example.host_1")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.get("com.example.host_1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_expired_skips_records_without_expiry() {
        let dir = tempdir().unwrap();
        let store = RedbRecordStore::connect(dir.path().join("ddns.db"), TIMEOUT)
            .await
            .unwrap();
        let now = 1_700_000_000;

        store
            .put("com.example.old_1", a_record("old.example.com", "10.0.0.1", now - 1))
            .await
            .unwrap();
        store
            .put("com.example.edge_1", a_record("edge.example.com", "10.0.0.2", now))
            .await
            .unwrap();
        store
            .put("com.example.later_1", a_record("later.example.com", "10.0.0.3", now + 60))
            .await
            .unwrap();
        store
            .put("com.example.forever_1", a_record("forever.example.com", "10.0.0.4", 0))
            .await
            .unwrap();

        let mut expired: Vec<String> = store.list_expired(now).await.unwrap().collect();
        expired.sort();
        assert_eq!(expired, vec!["com.example.edge_1", "com.example.old_1"]);

        let all: Vec<String> = store.list_expired(i64::MAX).await.unwrap().collect();
        assert!(!all.contains(&"com.example.forever_1".to_string()));
    }

    #[tokio::test]
    async fn connect_is_idempotent_within_a_process() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ddns.db");
        let first = RedbRecordStore::connect(&path, TIMEOUT).await.unwrap();
        let second = RedbRecordStore::connect(&path, TIMEOUT).await.unwrap();

        first
            .put("com.example.host_1", a_record("host.example.com", "10.0.0.1", 0))
            .await
            .unwrap();
        assert!(second.get("com.example.host_1").await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_closes_the_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ddns.db");
        let store = RedbRecordStore::connect(&path, TIMEOUT).await.unwrap();
        store
            .put("com.example.host_1", a_record("host.example.com", "10.0.0.1", 0))
            .await
            .unwrap();

        store.disconnect();
        store.disconnect();
        assert!(matches!(
            store.get("com.example.host_1").await,
            Err(Error::StoreClosed)
        ));

        // Records survive reopening the file.
        let reopened = RedbRecordStore::connect(&path, TIMEOUT).await.unwrap();
        let fetched = reopened.get("com.example.host_1").await.unwrap();
        assert_eq!(fetched.rr, "host.example.com. 60 IN A 10.0.0.1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_last_write_wins() {
        let dir = tempdir().unwrap();
        let store = RedbRecordStore::connect(dir.path().join("ddns.db"), TIMEOUT)
            .await
            .unwrap();

        let first = a_record("host.example.com", "10.0.0.1", 0);
        let second = a_record("host.example.com", "10.0.0.2", 0);
        let (a, b) = tokio::join!(
            tokio::spawn({
                let store = store.clone();
                let record = first.clone();
                async move { store.put("com.example.host_1", record).await }
            }),
            tokio::spawn({
                let store = store.clone();
                let record = second.clone();
                async move { store.put("com.example.host_1", record).await }
            }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let fetched = store.get("com.example.host_1").await.unwrap();
        assert!(fetched.rr == first.rr || fetched.rr == second.rr);
    }
}
