//! FsJobStore - one JSON document per job under a storage root.
//!
//! Layout: `<root>/<job id>.json`.
//!
//! Writes never modify a record file in place. The new document is written to
//! a temporary file in the same directory, fsynced, and renamed over the old
//! one, so a reader sees either the previous or the next version. Creation
//! uses a no-clobber rename, which makes "id already exists" atomic too.
//!
//! Updates are serialized per record twice: by an async lock inside the
//! process, and by an advisory lock on `<root>/.locks/<id>.lock` across
//! processes sharing the root. The OS drops the file lock when its holder
//! exits, so a crashed process never leaves a record locked.

use std::collections::HashMap;
use std::fs::{File, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as RecordLock;
use tracing::warn;

use crate::domain::{JobId, JobRecord};
use crate::error::{QueueError, Result};
use crate::ports::{JobStore, Mutator};

const RECORD_EXTENSION: &str = "json";
const TEMP_PREFIX: &str = ".spool-";
const LOCK_DIR: &str = ".locks";
const LOCK_RETRY: Duration = Duration::from_millis(2);

pub struct FsJobStore {
    root: PathBuf,
    lock_dir: PathBuf,
    /// One lock per record, serializing read-modify-write cycles on it.
    locks: Mutex<HashMap<JobId, Arc<RecordLock<()>>>>,
}

impl FsJobStore {
    /// Open an existing storage root. The directory is never created here.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let invalid = |reason: String| QueueError::InvalidStorageRoot {
            path: root.clone(),
            reason,
        };

        let meta = std::fs::metadata(&root).map_err(|e| invalid(e.to_string()))?;
        if !meta.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }
        // Check writability with the same kind of file every write uses.
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&root)
            .map_err(|e| invalid(format!("not writable: {e}")))?;
        let lock_dir = root.join(LOCK_DIR);
        std::fs::create_dir_all(&lock_dir)
            .map_err(|e| invalid(format!("cannot create {LOCK_DIR}: {e}")))?;

        Ok(Self {
            root,
            lock_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: JobId) -> PathBuf {
        self.root.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    fn record_lock(&self, id: JobId) -> Arc<RecordLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }

    /// Drop the map entry once nobody else holds or waits for it.
    fn release_record_lock(&self, id: JobId, lock: Arc<RecordLock<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
    }

    /// Take the cross-process lock for `id`. Released when the file is dropped.
    async fn lock_record_file(&self, id: JobId) -> Result<File> {
        let path = self.lock_dir.join(format!("{id}.lock"));
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .await?
            .into_std()
            .await;

        loop {
            match file.try_lock() {
                Ok(()) => return Ok(file),
                Err(TryLockError::WouldBlock) => tokio::time::sleep(LOCK_RETRY).await,
                Err(TryLockError::Error(e)) => return Err(e.into()),
            }
        }
    }

    async fn update_locked(&self, id: JobId, mutate: Mutator<'_>) -> Result<JobRecord> {
        let _file_lock = self.lock_record_file(id).await?;

        let mut record = self.read(id).await?;
        mutate(&mut record)?;
        self.write(&record, true).await?;
        Ok(record)
    }

    async fn write(&self, record: &JobRecord, overwrite: bool) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record).map_err(QueueError::Serialization)?;
        let root = self.root.clone();
        let target = self.record_path(record.id);

        tokio::task::spawn_blocking(move || write_atomic(&root, &target, &bytes, overwrite))
            .await
            .map_err(|e| std::io::Error::other(format!("write task failed: {e}")))??;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FsJobStore {
    async fn create(&self, record: &JobRecord) -> Result<()> {
        match self.write(record, false).await {
            Err(QueueError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                Err(QueueError::DuplicateId(record.id))
            }
            other => other,
        }
    }

    async fn read(&self, id: JobId) -> Result<JobRecord> {
        let path = self.record_path(id);
        read_record(&path).await?.ok_or(QueueError::NotFound(id))
    }

    async fn update(&self, id: JobId, mutate: Mutator<'_>) -> Result<JobRecord> {
        // Unknown ids fail before any lock file is created for them.
        self.read(id).await?;

        let lock = self.record_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.update_locked(id, mutate).await
        };
        self.release_record_lock(id, lock);
        result
    }

    async fn list(&self) -> Result<Vec<JobRecord>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_record_path(&path) {
                continue;
            }
            // A record cannot disappear (there is no delete), but tolerate it.
            match read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e @ QueueError::CorruptRecord { .. }) => {
                    warn!(error = %e, "skipping unreadable record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

fn is_record_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
        && path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| JobId::parse(stem).is_ok())
}

async fn read_record(path: &Path) -> Result<Option<JobRecord>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| QueueError::CorruptRecord {
            path: path.to_path_buf(),
            source,
        })
}

fn write_atomic(root: &Path, target: &Path, bytes: &[u8], overwrite: bool) -> std::io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(root)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if overwrite {
        tmp.persist(target)?;
    } else {
        tmp.persist_noclobber(target)?;
    }
    sync_dir(root)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
