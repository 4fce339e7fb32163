//! In-memory process store.

use async_trait::async_trait;
use std::collections::HashMap;
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{apply_pid, apply_status, sort_by_start, ProcessStore, StoreError, StoreResult};

/// Process store backed by a map. Records are lost when it is dropped.
#[derive(Default)]
pub struct InMemoryProcessStore {
    records: Mutex<HashMap<Uuid, ProcessRecord>>,
}

impl InMemoryProcessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    async fn matching(&self, predicate: impl Fn(&ProcessRecord) -> bool) -> Vec<ProcessRecord> {
        let records = self.records.lock().await;
        let mut matching: Vec<ProcessRecord> =
            records.values().filter(|r| predicate(r)).cloned().collect();
        sort_by_start(&mut matching);
        matching
    }
}

#[async_trait]
impl ProcessStore for InMemoryProcessStore {
    async fn create(&self, record: &ProcessRecord) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ProcessRecord>> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn find_running_by_script_id(
        &self,
        script_id: Uuid,
    ) -> StoreResult<Option<ProcessRecord>> {
        Ok(self
            .matching(|r| r.script_id == script_id && r.is_running())
            .await
            .into_iter()
            .next())
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> StoreResult<Vec<ProcessRecord>> {
        Ok(self.matching(|r| r.user_id == user_id).await)
    }

    async fn find_by_script_id(&self, script_id: Uuid) -> StoreResult<Vec<ProcessRecord>> {
        Ok(self.matching(|r| r.script_id == script_id).await)
    }

    async fn update(&self, record: &ProcessRecord) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        match records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id)),
        }
    }

    async fn set_pid(&self, id: Uuid, pid: u32) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply_pid(record, pid);
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ProcessStatus,
        exit_code: Option<i32>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply_status(record, status, exit_code, error);
        Ok(())
    }
}
