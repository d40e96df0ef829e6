use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::error::StoreError;
use super::queue::PendingQueue;
use crate::position::PositionFix;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

const LAST_KNOWN_RECORD: &str = "last_known";
const PENDING_RECORD: &str = "pending";
const KV_FOLDER: &str = "kv";
const TMP_EXTENSION: &str = "tmp";

/// Most recently accepted fix and when it was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastKnownPosition {
    pub fix: PositionFix,
    pub accepted_at: DateTime<Utc>,
}

/// Durable records for the telemetry pipeline, one JSON file per record.
///
/// Every write goes to a temporary sibling which is synced and renamed over the record,
/// so a crash leaves either the old or the new content, never a mix. Leftover temporary
/// files from an interrupted write are discarded on open.
#[derive(Debug)]
pub struct SampleStore {
    base: PathBuf,
    capacity: usize,
}

impl SampleStore {
    pub fn open(base: PathBuf, capacity: usize) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity);
        }

        let store = SampleStore { base, capacity };
        let kv = store.kv_path();
        fs::create_dir_all(&kv).map_err(|e| StoreError::io(KV_FOLDER, e))?;
        store.discard_partial_writes(&store.base)?;
        store.discard_partial_writes(&kv)?;
        Ok(store)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get_last_known(&self) -> Result<Option<LastKnownPosition>, StoreError> {
        self.read_record(LAST_KNOWN_RECORD, &self.record_path(LAST_KNOWN_RECORD))
    }

    /// Unconditionally overwrite the last-known position with `fix`.
    pub fn set_last_known(&self, fix: &PositionFix) -> Result<LastKnownPosition, StoreError> {
        let record = LastKnownPosition {
            fix: fix.clone(),
            accepted_at: Utc::now(),
        };
        self.write_record(
            LAST_KNOWN_RECORD,
            &self.record_path(LAST_KNOWN_RECORD),
            &record,
        )?;
        Ok(record)
    }

    /// Explicit cache-clear of the last-known position.
    pub fn clear_last_known(&self) -> Result<(), StoreError> {
        remove_if_exists(LAST_KNOWN_RECORD, &self.record_path(LAST_KNOWN_RECORD))
    }

    /// Append `fix` to the pending queue, evicting the oldest entries once at capacity.
    /// A sample already pending is not queued twice. Returns what was evicted.
    pub fn enqueue(&self, fix: &PositionFix) -> Result<Vec<PositionFix>, StoreError> {
        let mut queue = self.load_pending()?;
        if queue.contains_sample(fix) {
            debug!("sample {} already pending", fix.captured_at);
            return Ok(Vec::new());
        }
        let evicted = queue.push(fix.clone(), self.capacity);
        self.save_pending(&queue)?;

        for dropped in &evicted {
            warn!(
                "Pending queue full ({}), evicted sample captured at {}",
                self.capacity, dropped.captured_at
            );
        }
        Ok(evicted)
    }

    /// Remove the first pending entry denoting the same sample as `fix`. Absent entries
    /// are a no-op; returns whether anything was removed.
    pub fn dequeue_acknowledged(&self, fix: &PositionFix) -> Result<bool, StoreError> {
        let mut queue = self.load_pending()?;
        if !queue.remove_sample(fix) {
            debug!("sample {} already gone from queue", fix.captured_at);
            return Ok(false);
        }
        self.save_pending(&queue)?;
        Ok(true)
    }

    /// Snapshot of the pending queue, oldest first.
    pub fn list_pending(&self) -> Result<Vec<PositionFix>, StoreError> {
        Ok(self.load_pending()?.to_vec())
    }

    pub fn pending_len(&self) -> Result<usize, StoreError> {
        Ok(self.load_pending()?.len())
    }

    /// Drop every pending entry. Returns how many were dropped.
    pub fn clear_pending(&self) -> Result<usize, StoreError> {
        let dropped = self.load_pending()?.len();
        self.save_pending(&PendingQueue::new())?;
        Ok(dropped)
    }

    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let path = self.kv_record_path(key)?;
        self.read_record(key, &path)
    }

    pub fn put_value<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let path = self.kv_record_path(key)?;
        self.write_record(key, &path, value)
    }

    pub fn remove_value(&self, key: &str) -> Result<(), StoreError> {
        let path = self.kv_record_path(key)?;
        remove_if_exists(key, &path)
    }

    fn load_pending(&self) -> Result<PendingQueue, StoreError> {
        Ok(self
            .read_record(PENDING_RECORD, &self.record_path(PENDING_RECORD))?
            .unwrap_or_default())
    }

    fn save_pending(&self, queue: &PendingQueue) -> Result<(), StoreError> {
        self.write_record(PENDING_RECORD, &self.record_path(PENDING_RECORD), queue)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.base.join(format!("{}.json", name))
    }

    fn kv_path(&self) -> PathBuf {
        self.base.join(KV_FOLDER)
    }

    fn kv_record_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.kv_path().join(format!("{}.json", key)))
    }

    fn read_record<T: DeserializeOwned>(
        &self,
        record: &str,
        path: &Path,
    ) -> Result<Option<T>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(record, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                record: record.to_string(),
                source,
            })
    }

    fn write_record<T: Serialize>(
        &self,
        record: &str,
        path: &Path,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
            record: record.to_string(),
            source,
        })?;

        let tmp = path.with_extension(TMP_EXTENSION);
        let mut file = File::create(&tmp).map_err(|e| StoreError::io(record, e))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::io(record, e))?;
        drop(file);

        fs::rename(&tmp, path).map_err(|e| StoreError::io(record, e))?;
        if let Some(parent) = path.parent() {
            sync_dir(parent);
        }
        Ok(())
    }

    fn discard_partial_writes(&self, dir: &Path) -> Result<(), StoreError> {
        let entries = fs::read_dir(dir).map_err(|e| StoreError::io("store", e))?;
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io("store", e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == TMP_EXTENSION) {
                warn!("Discarding interrupted write {}", path.display());
                fs::remove_file(&path).map_err(|e| StoreError::io("store", e))?;
            }
        }
        Ok(())
    }
}

fn remove_if_exists(record: &str, path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(record, e)),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("directory sync failed for {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
