//! JSON-file process store.
//!
//! Each record lives in `<dir>/<id>.json`. Writes go through a temporary
//! file and a rename so a crashed writer never leaves a truncated record.
//! Records written by an earlier supervisor process stay visible, which is
//! what makes orphan recovery possible after a restart.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::{apply_pid, apply_status, sort_by_start, ProcessStore, StoreError, StoreResult};

pub struct FileProcessStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileProcessStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read(&self, id: Uuid) -> StoreResult<Option<ProcessRecord>> {
        match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, record: &ProcessRecord) -> StoreResult<()> {
        let path = self.record_path(record.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Every readable record in the directory. Unreadable files are skipped
    /// with a warning so one corrupt document does not hide the rest.
    async fn scan(
        &self,
        predicate: impl Fn(&ProcessRecord) -> bool,
    ) -> StoreResult<Vec<ProcessRecord>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let parsed = match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    serde_json::from_slice::<ProcessRecord>(&bytes).map_err(StoreError::from)
                }
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(record) if predicate(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable process record")
                }
            }
        }

        sort_by_start(&mut records);
        Ok(records)
    }
}

#[async_trait]
impl ProcessStore for FileProcessStore {
    async fn create(&self, record: &ProcessRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        if self.read(record.id).await?.is_some() {
            return Err(StoreError::Duplicate(record.id));
        }
        self.write(record).await
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ProcessRecord>> {
        self.read(id).await
    }

    async fn find_running_by_script_id(
        &self,
        script_id: Uuid,
    ) -> StoreResult<Option<ProcessRecord>> {
        Ok(self
            .scan(|r| r.script_id == script_id && r.is_running())
            .await?
            .into_iter()
            .next())
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> StoreResult<Vec<ProcessRecord>> {
        self.scan(|r| r.user_id == user_id).await
    }

    async fn find_by_script_id(&self, script_id: Uuid) -> StoreResult<Vec<ProcessRecord>> {
        self.scan(|r| r.script_id == script_id).await
    }

    async fn update(&self, record: &ProcessRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        if self.read(record.id).await?.is_none() {
            return Err(StoreError::NotFound(record.id));
        }
        self.write(record).await
    }

    async fn set_pid(&self, id: Uuid, pid: u32) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read(id).await?.ok_or(StoreError::NotFound(id))?;
        if apply_pid(&mut record, pid) {
            self.write(&record).await?;
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ProcessStatus,
        exit_code: Option<i32>,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read(id).await?.ok_or(StoreError::NotFound(id))?;
        apply_status(&mut record, status, exit_code, error);
        self.write(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let record = ProcessRecord::admitted(Uuid::new_v4(), Uuid::new_v4());

        {
            let store = FileProcessStore::open(dir.path()).await.unwrap();
            store.create(&record).await.unwrap();
        }

        let reopened = FileProcessStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.find_by_id(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_update_status_persists_terminal_state() {
        let dir = tempdir().unwrap();
        let store = FileProcessStore::open(dir.path()).await.unwrap();
        let mut record = ProcessRecord::admitted(Uuid::new_v4(), Uuid::new_v4());
        store.create(&record).await.unwrap();

        record.pid = Some(1234);
        store.update(&record).await.unwrap();
        store
            .update_status(
                record.id,
                ProcessStatus::Stopped,
                Some(-1),
                Some("Process stopped by user"),
            )
            .await
            .unwrap();

        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.pid, Some(1234));
        assert_eq!(stored.status, ProcessStatus::Stopped);
        assert!(stored.end_time.is_some());
        assert!(!dir.path().join(format!("{}.json.tmp", record.id)).exists());
    }

    #[tokio::test]
    async fn test_set_pid_does_not_revive_terminal_record() {
        let dir = tempdir().unwrap();
        let store = FileProcessStore::open(dir.path()).await.unwrap();
        let record = ProcessRecord::admitted(Uuid::new_v4(), Uuid::new_v4());
        store.create(&record).await.unwrap();

        // Another instance stops the run before the pid is written.
        let other = FileProcessStore::open(dir.path()).await.unwrap();
        other
            .update_status(
                record.id,
                ProcessStatus::Stopped,
                Some(-1),
                Some("Process stopped by user"),
            )
            .await
            .unwrap();
        store.set_pid(record.id, 4242).await.unwrap();

        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessStatus::Stopped);
        assert_eq!(stored.pid, None);
    }

    #[tokio::test]
    async fn test_scan_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        let store = FileProcessStore::open(dir.path()).await.unwrap();
        let script_id = Uuid::new_v4();
        let record = ProcessRecord::admitted(script_id, Uuid::new_v4());
        store.create(&record).await.unwrap();
        std::fs::write(dir.path().join("garbage.json"), b"{ not json").unwrap();

        let running = store.find_running_by_script_id(script_id).await.unwrap();
        assert_eq!(running.map(|r| r.id), Some(record.id));
        assert_eq!(store.find_by_script_id(script_id).await.unwrap().len(), 1);
    }
}
