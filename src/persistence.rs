// Persistence for whole entity record sets.
// Each entity ("hotel", "customer") is loaded and written back as a single
// document under an exclusive entity-scoped lock. The lock covers the whole
// table, not individual records: two writers touching different hotels still
// serialize through the same lock.

use dashmap::DashMap;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error for entity {entity}: {source}")]
    Serialization {
        entity: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Timed out after {waited_ms}ms waiting for the {entity} lock")]
    LockTimeout { entity: String, waited_ms: u64 },

    #[error("Invalid entity name: {0:?}")]
    InvalidEntityName(String),

    #[error("Store rejected write for entity {entity}")]
    WriteRejected { entity: String },
}

// Load/update contract every reader and writer of an entity goes through
pub trait RecordStore: Send + Sync {
    // Returns `T::default()` when the entity has never been written
    fn load<T: DeserializeOwned + Default>(&self, entity: &str) -> Result<T, PersistenceError>;

    // Replaces the full record set of the entity
    fn update<T: Serialize>(&self, entity: &str, records: &T) -> Result<(), PersistenceError>;

    // Initializes the entity with an empty record set
    fn create(&self, entity: &str) -> Result<(), PersistenceError> {
        self.update(entity, &serde_json::Map::new())
    }
}

fn validate_entity_name(entity: &str) -> Result<(), PersistenceError> {
    let valid = !entity.is_empty()
        && entity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidEntityName(entity.to_string()))
    }
}

fn io_error(path: &Path, source: io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// JSON files on disk: `<data_dir>/<entity>.json` guarded by an exclusive
// advisory lock on `<data_dir>/<entity>.lock`.
pub struct JsonFileStore {
    config: StoreConfig,
    // Threads of this process queue here before competing for the lock file
    entity_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JsonFileStore {
    pub fn new(config: StoreConfig) -> Result<Self, PersistenceError> {
        fs::create_dir_all(&config.data_dir).map_err(|e| io_error(&config.data_dir, e))?;
        info!(data_dir = %config.data_dir.display(), "Opened JSON record store");
        Ok(Self {
            config,
            entity_locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_path(&self, entity: &str) -> PathBuf {
        self.config.data_dir.join(format!("{}.json", entity))
    }

    pub fn lock_path(&self, entity: &str) -> PathBuf {
        self.config.data_dir.join(format!("{}.lock", entity))
    }

    fn entity_lock(&self, entity: &str) -> Arc<Mutex<()>> {
        self.entity_locks
            .entry(entity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Runs `f` while holding both the in-process and the on-disk lock for the
    // entity. Both are released when this returns, whatever `f` returned.
    fn with_lock<R>(
        &self,
        entity: &str,
        f: impl FnOnce() -> Result<R, PersistenceError>,
    ) -> Result<R, PersistenceError> {
        validate_entity_name(entity)?;
        let started = Instant::now();
        let deadline = started + self.config.lock_timeout();

        let local = self.entity_lock(entity);
        let _local_guard = local.try_lock_for(self.config.lock_timeout()).ok_or_else(|| {
            warn!(entity, "Timed out waiting for in-process entity lock");
            PersistenceError::LockTimeout {
                entity: entity.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            }
        })?;

        let _file_guard = self.acquire_lock_file(entity, started, deadline)?;
        f()
    }

    // Blocks until this handle holds the OS advisory lock on the entity's
    // lock file. The kernel drops the lock when the holder exits, however it
    // exits, so a crashed writer never wedges the entity.
    fn acquire_lock_file(
        &self,
        entity: &str,
        started: Instant,
        deadline: Instant,
    ) -> Result<LockFileGuard, PersistenceError> {
        let path = self.lock_path(entity);
        let file = open_lock_file(&path)?;
        let mut attempt: u32 = 0;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(entity, attempt, "Acquired entity lock after contention");
                    }
                    return Ok(LockFileGuard { path, file });
                }
                Err(e) if is_contended(&e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(entity, lock = %path.display(), "Timed out waiting for entity lock file");
                        return Err(PersistenceError::LockTimeout {
                            entity: entity.to_string(),
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    let pause = poll_backoff(attempt, self.config.lock_poll_interval())
                        .min(deadline - now);
                    thread::sleep(pause);
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(io_error(&path, e)),
            }
        }
    }

    // True while any handle, in this process or another, holds the entity lock
    pub fn is_locked(&self, entity: &str) -> Result<bool, PersistenceError> {
        validate_entity_name(entity)?;
        let path = self.lock_path(entity);
        if !path.exists() {
            return Ok(false);
        }
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                FileExt::unlock(&file).map_err(|e| io_error(&path, e))?;
                Ok(false)
            }
            Err(e) if is_contended(&e) => Ok(true),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

// The lock file itself is never removed; only the lock on it comes and goes
fn open_lock_file(path: &Path) -> Result<File, PersistenceError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| io_error(path, e))
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

// Exponential backoff capped at 8x the base interval, with jitter so waiting
// processes do not retry in lockstep
fn poll_backoff(attempt: u32, base: Duration) -> Duration {
    let base_ms = base.as_millis().max(1) as f64;
    let backoff_ms = (base_ms * 2f64.powi(attempt.min(3) as i32)).min(base_ms * 8.0);
    let jitter = rand::random::<f64>() * 0.2 * backoff_ms;
    Duration::from_millis((backoff_ms * 0.9 + jitter) as u64)
}

struct LockFileGuard {
    path: PathBuf,
    file: File,
}

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        // Closing the handle right after releases the lock even if this fails
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(lock = %self.path.display(), error = %e, "Failed to release entity lock");
        }
    }
}

impl RecordStore for JsonFileStore {
    fn load<T: DeserializeOwned + Default>(&self, entity: &str) -> Result<T, PersistenceError> {
        let path = self.data_path(entity);
        let content = self.with_lock(entity, || match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        })?;

        match content {
            Some(content) => {
                let records = serde_json::from_str(&content).map_err(|source| {
                    PersistenceError::Serialization {
                        entity: entity.to_string(),
                        source,
                    }
                })?;
                debug!(entity, path = %path.display(), bytes = content.len(), "Loaded entity");
                Ok(records)
            }
            None => {
                debug!(entity, path = %path.display(), "No backing file, starting empty");
                Ok(T::default())
            }
        }
    }

    fn update<T: Serialize>(&self, entity: &str, records: &T) -> Result<(), PersistenceError> {
        let content =
            serde_json::to_string(records).map_err(|source| PersistenceError::Serialization {
                entity: entity.to_string(),
                source,
            })?;
        let path = self.data_path(entity);
        let tmp_path = self.config.data_dir.join(format!("{}.json.tmp", entity));

        self.with_lock(entity, || {
            // Readers only ever see the old file or the complete new one
            fs::write(&tmp_path, content.as_bytes()).map_err(|e| io_error(&tmp_path, e))?;
            fs::rename(&tmp_path, &path).map_err(|e| io_error(&path, e))
        })?;

        debug!(entity, path = %path.display(), bytes = content.len(), "Stored entity");
        Ok(())
    }
}

// Keeps serialized record sets in memory. Used in tests and by callers that
// do not need durability; writes can be switched off to exercise failure paths.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: DashMap<String, String>,
    reject_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.documents.contains_key(entity)
    }

    pub fn raw(&self, entity: &str) -> Option<String> {
        self.documents.get(entity).map(|doc| doc.value().clone())
    }
}

impl RecordStore for InMemoryStore {
    fn load<T: DeserializeOwned + Default>(&self, entity: &str) -> Result<T, PersistenceError> {
        validate_entity_name(entity)?;
        match self.documents.get(entity) {
            Some(doc) => serde_json::from_str(doc.value()).map_err(|source| {
                PersistenceError::Serialization {
                    entity: entity.to_string(),
                    source,
                }
            }),
            None => Ok(T::default()),
        }
    }

    fn update<T: Serialize>(&self, entity: &str, records: &T) -> Result<(), PersistenceError> {
        validate_entity_name(entity)?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::WriteRejected {
                entity: entity.to_string(),
            });
        }
        let content =
            serde_json::to_string(records).map_err(|source| PersistenceError::Serialization {
                entity: entity.to_string(),
                source,
            })?;
        self.documents.insert(entity.to_string(), content);
        Ok(())
    }
}
