// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic, per-path-locked JSON persistence (C1).
//!
//! Every on-disk mutation performed by any other component in this crate
//! (or in `agentfleet-server`) passes through an [`AtomicStore`]. Writes go
//! to a uniquely-named temp file, are fsynced, then renamed over the
//! target so a reader never observes a partially-written file. Reads of a
//! missing or corrupt file fall back to a caller-supplied default instead
//! of propagating an error — only genuine IO/permission failures do.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{CoreError, CoreResult};

/// Serializes concurrent operations keyed by filesystem path.
///
/// Two independent lock maps are kept (file lock, operation lock) so that
/// [`AtomicStore::modify_json`]'s read-then-write cycle cannot deadlock
/// against a bare [`AtomicStore::atomic_write_json`] call taking the file
/// lock directly.
#[derive(Default)]
pub struct AtomicStore {
    file_locks: SyncMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
    op_locks: SyncMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl AtomicStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(map: &SyncMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut guard = map.lock();
        Arc::clone(guard.entry(path.to_path_buf()).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }

    fn file_lock(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        Self::lock_for(&self.file_locks, path)
    }

    fn op_lock(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        Self::lock_for(&self.op_locks, path)
    }

    /// Create `path` and all of its parent components if missing.
    pub async fn ensure_dir(&self, path: &Path) -> CoreResult<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    /// Write `bytes` to `path` atomically: temp file, fsync, rename.
    ///
    /// Serialized per-path via the file lock so concurrent writers never
    /// interleave; the file ends up containing exactly one writer's bytes.
    pub async fn atomic_write(&self, path: &Path, bytes: &[u8]) -> CoreResult<()> {
        let lock = self.file_lock(path);
        let _guard = lock.lock().await;
        self.atomic_write_locked(path, bytes).await
    }

    async fn atomic_write_locked(&self, path: &Path, bytes: &[u8]) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = append_suffix(path, &format!(".tmp.{}", uuid::Uuid::new_v4()));

        let result: CoreResult<()> = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            use tokio::io::AsyncWriteExt;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, path).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }
        result
    }

    /// Serialize `value` as pretty JSON and write it atomically.
    pub async fn atomic_write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.atomic_write(path, &bytes).await
    }

    /// Read and parse `path` as JSON, returning `default` if the file is
    /// missing or fails to parse. A parse failure quarantines the
    /// original file by copying it aside as `<path>.corrupt.<epoch_ms>`.
    pub async fn safe_read_json<T: DeserializeOwned>(&self, path: &Path, default: T) -> T {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return default,
            Err(_) => return default,
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "corrupt JSON file, quarantining");
                self.quarantine(path).await;
                default
            }
        }
    }

    async fn quarantine(&self, path: &Path) {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let quarantine_path = append_suffix(path, &format!(".corrupt.{ts}"));
        if let Err(e) = tokio::fs::copy(path, &quarantine_path).await {
            tracing::warn!(path = %path.display(), err = %e, "failed to quarantine corrupt file");
        }
    }

    /// Run `op` while holding the path's file-level lock, without the
    /// read/default/write choreography of [`Self::modify_json`].
    pub async fn with_file_lock<F, Fut, T>(&self, path: &Path, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.file_lock(path);
        let _guard = lock.lock().await;
        op().await
    }

    /// Run `op` while holding the path's operation-level lock. Distinct
    /// from [`Self::with_file_lock`] so a caller can hold the operation
    /// lock across a read-then-write cycle without blocking unrelated
    /// single-shot writers on the same path's file lock.
    pub async fn with_operation_lock<F, Fut, T>(&self, path: &Path, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.op_lock(path);
        let _guard = lock.lock().await;
        op().await
    }

    /// Read-modify-write a JSON file under the operation lock.
    ///
    /// `mutator` receives the current value (or `default` if missing/
    /// corrupt) and either mutates it in place and returns `None`, or
    /// returns `Some(new_value)` to replace it outright. Either way the
    /// result is written back atomically. The operation lock is released
    /// even if `mutator` returns an error.
    pub async fn modify_json<T, E, F>(&self, path: &Path, default: T, mutator: F) -> CoreResult<T>
    where
        T: Serialize + DeserializeOwned + Clone + Sync,
        F: FnOnce(&mut T) -> Result<Option<T>, E>,
        E: std::fmt::Display,
    {
        let lock = self.op_lock(path);
        let _guard = lock.lock().await;

        let mut value = self.safe_read_json(path, default).await;
        let outcome = mutator(&mut value);

        let final_value = match outcome {
            Ok(Some(replacement)) => replacement,
            Ok(None) => value,
            Err(e) => return Err(CoreError::Internal(e.to_string())),
        };

        self.atomic_write_json(path, &final_value).await?;
        Ok(final_value)
    }
}

/// Append `suffix` to `path`'s final component, preserving its extension.
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
