use crate::error::Error;
use crate::record_store::{new_id, RecordStore, StoredRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default, Debug)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, key: &str, mut record: StoredRecord) -> Result<(), Error> {
        record.id = new_id();
        tracing::debug!("set ID {} for {key}", record.id);
        self.records.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredRecord, Error> {
        self.records
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.records
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn list_expired(
        &self,
        now: i64,
    ) -> Result<Box<dyn Iterator<Item = String> + Send>, Error> {
        let expired: Vec<String> = self
            .records
            .read()
            .await
            .iter()
            .filter(|(_, record)| record.expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        Ok(Box::new(expired.into_iter()))
    }
}
