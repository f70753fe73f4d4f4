// # File Snapshot Store
//
// File-based implementation of SnapshotStore with crash recovery.
//
// ## Purpose
//
// Provides persistent snapshots and history for single-host deployments
// without a database.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "domains": {
//     "example.com": { "name": "example.com", "spf": "v=spf1 ~all", ... }
//   },
//   "history": {
//     "example.com": [ { "name": "example.com", "spf": "v=spf1 ~all", ... } ]
//   }
// }
// ```
//
// Domains are registered by editing `domains` or through
// [`FileSnapshotStore::insert_domain`].
//
// ## Write Policy
//
// | Operation        | Disk write                          |
// |------------------|-------------------------------------|
// | `insert_domain`  | immediate                           |
// | `append_history` | immediate                           |
// | `update_field`   | buffered until `flush` or next write |
//
// Immediate writes are committed on a copy of the state. The in-memory
// state only changes after the rename succeeded, so a failed write leaves
// nothing behind that a later detection could compare against.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::Error;
use crate::model::{DomainSnapshot, SnapshotField};
use crate::traits::SnapshotStore;

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based snapshot store with crash recovery
///
/// History appends and domain registration reach the disk before the call
/// returns. Live-field updates are buffered until [`SnapshotStore::flush`].
///
/// # Example
///
/// ```rust,no_run
/// use domwatch_core::state::FileSnapshotStore;
/// use domwatch_core::{DomainSnapshot, SnapshotStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSnapshotStore::new("/var/lib/domwatch/state.json").await?;
///     store.insert_domain(DomainSnapshot::new("example.com")).await?;
///
///     let active = store.list_active().await?;
///     assert_eq!(active.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    state: Arc<RwLock<StateFileFormat>>,
    /// Buffered live-field updates not yet on disk
    dirty: AtomicBool,
    /// Serializes mutations so a commit never overwrites a concurrent change
    write_lock: Mutex<()>,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    #[serde(default)]
    domains: HashMap<String, DomainSnapshot>,
    #[serde(default)]
    history: HashMap<String, Vec<DomainSnapshot>>,
}

impl Default for StateFileFormat {
    fn default() -> Self {
        Self {
            version: STATE_FILE_VERSION.to_string(),
            domains: HashMap::new(),
            history: HashMap::new(),
        }
    }
}

/// Why a state file could not be loaded
enum LoadFailure {
    /// The file exists but could not be read
    Unreadable(Error),
    /// The file was read but is not valid state JSON
    Corrupted(Error),
}

impl FileSnapshotStore {
    /// Create or load a file snapshot store
    ///
    /// This will:
    /// 1. Try to load existing state file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty state
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let state = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
            dirty: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        })
    }

    /// Register a domain, replacing any live snapshot with the same name
    pub async fn insert_domain(&self, snapshot: DomainSnapshot) -> Result<(), Error> {
        self.commit(|state| {
            state.domains.insert(snapshot.name.clone(), snapshot);
        })
        .await
    }

    /// Number of history rows recorded for a domain
    pub async fn history_len(&self, domain: &str) -> usize {
        let guard = self.state.read().await;
        guard.history.get(domain).map_or(0, Vec::len)
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main state file
    /// 2. If JSON parse error, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_state_with_recovery(path: &Path) -> Result<StateFileFormat, Error> {
        let error = match Self::load_state(path).await {
            Ok(state) => {
                tracing::debug!("Loaded state from file: {} domains", state.domains.len());
                return Ok(state);
            }
            Err(LoadFailure::Unreadable(e)) => return Err(e),
            Err(LoadFailure::Corrupted(e)) => e,
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            error
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty state.");
            return Ok(StateFileFormat::default());
        }

        match Self::load_state(&backup_path).await {
            Ok(state) => {
                tracing::info!("Recovered state from backup: {} domains", state.domains.len());

                if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!("Failed to restore state file from backup: {}", restore_err);
                }

                Ok(state)
            }
            Err(LoadFailure::Unreadable(e)) | Err(LoadFailure::Corrupted(e)) => {
                tracing::error!("Backup also unusable: {}. Starting with empty state.", e);
                Ok(StateFileFormat::default())
            }
        }
    }

    /// Load state from file
    async fn load_state(path: &Path) -> Result<StateFileFormat, LoadFailure> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(StateFileFormat::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadFailure::Unreadable(Error::store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        let state: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadFailure::Corrupted(Error::store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            )))
        })?;

        if state.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state.version
            );
        }

        Ok(state)
    }

    /// Apply a mutation, persist it, then publish it
    ///
    /// The mutation runs on a copy. On a failed write the in-memory state is
    /// left as it was.
    async fn commit<F>(&self, mutate: F) -> Result<(), Error>
    where
        F: FnOnce(&mut StateFileFormat),
    {
        let _writer = self.write_lock.lock().await;

        let mut next = self.state.read().await.clone();
        mutate(&mut next);
        self.write_state(&next).await?;

        *self.state.write().await = next;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Write state to file atomically
    async fn write_state(&self, state: &StateFileFormat) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::store(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn list_active(&self) -> Result<Vec<DomainSnapshot>, Error> {
        let guard = self.state.read().await;
        let mut active: Vec<DomainSnapshot> = guard
            .domains
            .values()
            .filter(|snapshot| snapshot.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }

    async fn get_current(&self, domain: &str) -> Result<Option<DomainSnapshot>, Error> {
        let guard = self.state.read().await;
        Ok(guard.domains.get(domain).cloned())
    }

    async fn get_latest_history(&self, domain: &str) -> Result<Option<DomainSnapshot>, Error> {
        let guard = self.state.read().await;
        Ok(guard
            .history
            .get(domain)
            .and_then(|rows| rows.last())
            .cloned())
    }

    async fn update_field(
        &self,
        domain: &str,
        field: SnapshotField,
        value: &str,
    ) -> Result<(), Error> {
        let _writer = self.write_lock.lock().await;
        let mut guard = self.state.write().await;

        if let Some(snapshot) = guard.domains.get_mut(domain) {
            field.apply(snapshot, value);
            snapshot.last_check = Utc::now();
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn append_history(&self, snapshot: &DomainSnapshot) -> Result<(), Error> {
        self.commit(|state| {
            state
                .history
                .entry(snapshot.name.clone())
                .or_default()
                .push(snapshot.clone());
        })
        .await
    }

    async fn flush(&self) -> Result<(), Error> {
        let _writer = self.write_lock.lock().await;
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }

        let state = self.state.read().await.clone();
        self.write_state(&state).await?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }
}
