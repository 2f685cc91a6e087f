//! Storage collaborators for the template document and managed records.
//!
//! The whole panel state is one [`Database`] snapshot. A [`PanelStore`]
//! serializes access with a lock and runs every mutation as a transaction:
//! load the snapshot, mutate it in memory, persist it only when the closure
//! succeeds. A failed transaction leaves storage untouched.

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Inbound, ManagedRecord, Outbound};
use crate::types::ResourceKind;

/// Current on-disk snapshot format.
pub const DATABASE_VERSION: u32 = 1;

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt database {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported database version: {0}")]
    UnsupportedVersion(u32),

    #[error("{kind} tag must not be empty")]
    EmptyTag { kind: ResourceKind },

    #[error("{kind} tag already exists: {tag}")]
    TagConflict { kind: ResourceKind, tag: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: u64 },

    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Full panel state as persisted by a [`Backend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    /// Snapshot format version
    pub version: u32,

    /// Timestamp of the last committed transaction
    pub saved_at: chrono::DateTime<chrono::Utc>,

    /// Stored advanced-settings template, `None` until first saved
    #[serde(default)]
    pub template: Option<String>,

    #[serde(default)]
    pub inbounds: Vec<Inbound>,

    #[serde(default)]
    pub outbounds: Vec<Outbound>,

    /// Last inbound id handed out
    #[serde(default)]
    pub inbound_seq: u64,

    /// Last outbound id handed out
    #[serde(default)]
    pub outbound_seq: u64,
}

impl Database {
    /// Create an empty database
    pub fn new() -> Self {
        Self {
            version: DATABASE_VERSION,
            saved_at: chrono::Utc::now(),
            template: None,
            inbounds: Vec::new(),
            outbounds: Vec::new(),
            inbound_seq: 0,
            outbound_seq: 0,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.version != DATABASE_VERSION {
            return Err(StoreError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold on a backend for the span of one transaction.
///
/// Released when dropped.
#[derive(Debug, Default)]
pub struct BackendLock {
    file: Option<File>,
}

impl BackendLock {
    /// A hold that excludes nothing beyond the store's own mutex.
    pub fn none() -> Self {
        Self::default()
    }

    /// A hold backed by an exclusive advisory lock on `file`.
    pub fn on_file(file: File) -> Self {
        Self { file: Some(file) }
    }
}

impl Drop for BackendLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            // Closing the handle releases the lock as well
            let _ = fs2::FileExt::unlock(file);
        }
    }
}

/// Loads and persists whole [`Database`] snapshots.
pub trait Backend: Send + Sync + fmt::Debug {
    fn load(&self) -> Result<Database, StoreError>;

    /// Persist the snapshot all-or-nothing.
    fn persist(&self, database: &Database) -> Result<(), StoreError>;

    /// Keep other stores over the same storage out until the hold is dropped.
    ///
    /// Backends shared between processes must override this.
    fn lock(&self) -> Result<BackendLock, StoreError> {
        Ok(BackendLock::none())
    }
}

/// Access to the stored template document text.
pub trait TemplateStore {
    fn template(&self) -> Option<&str>;

    fn save_template(&mut self, text: String) -> Result<(), StoreError>;
}

/// CRUD access to one table of managed records.
pub trait RecordStore<R: ManagedRecord> {
    fn list_all(&self) -> Vec<R>;

    fn get(&self, id: u64) -> Option<R>;

    /// Create the record when it has no id, otherwise update it in place.
    ///
    /// Fails with [`StoreError::TagConflict`] when another record of the same
    /// kind already carries the tag, and with [`StoreError::EmptyTag`] when
    /// the record has none.
    fn save(&mut self, record: R) -> Result<R, StoreError>;

    fn delete_by_id(&mut self, id: u64) -> Result<(), StoreError>;
}

/// Maps a record type onto its table in the [`Database`] snapshot.
pub trait TableRecord: ManagedRecord {
    fn rows(database: &Database) -> &Vec<Self>;

    fn rows_mut(database: &mut Database) -> &mut Vec<Self>;

    fn sequence(database: &mut Database) -> &mut u64;
}

impl TableRecord for Inbound {
    fn rows(database: &Database) -> &Vec<Self> {
        &database.inbounds
    }

    fn rows_mut(database: &mut Database) -> &mut Vec<Self> {
        &mut database.inbounds
    }

    fn sequence(database: &mut Database) -> &mut u64 {
        &mut database.inbound_seq
    }
}

impl TableRecord for Outbound {
    fn rows(database: &Database) -> &Vec<Self> {
        &database.outbounds
    }

    fn rows_mut(database: &mut Database) -> &mut Vec<Self> {
        &mut database.outbounds
    }

    fn sequence(database: &mut Database) -> &mut u64 {
        &mut database.outbound_seq
    }
}

/// In-memory view of the database during one transaction.
#[derive(Debug)]
pub struct Transaction<'a> {
    database: &'a mut Database,
    dirty: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(database: &'a mut Database) -> Self {
        Self {
            database,
            dirty: false,
        }
    }

    /// Whether anything was written in this transaction.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn enabled_outbounds(&self) -> Vec<Outbound> {
        self.database
            .outbounds
            .iter()
            .filter(|outbound| outbound.enable)
            .cloned()
            .collect()
    }
}

impl TemplateStore for Transaction<'_> {
    fn template(&self) -> Option<&str> {
        self.database.template.as_deref()
    }

    fn save_template(&mut self, text: String) -> Result<(), StoreError> {
        self.database.template = Some(text);
        self.dirty = true;
        Ok(())
    }
}

impl<R: TableRecord> RecordStore<R> for Transaction<'_> {
    fn list_all(&self) -> Vec<R> {
        R::rows(self.database).clone()
    }

    fn get(&self, id: u64) -> Option<R> {
        R::rows(self.database)
            .iter()
            .find(|row| row.id() == Some(id))
            .cloned()
    }

    fn save(&mut self, mut record: R) -> Result<R, StoreError> {
        let tag = record.tag();
        if tag.is_empty() {
            return Err(StoreError::EmptyTag { kind: R::KIND });
        }
        if R::rows(self.database)
            .iter()
            .any(|row| row.tag() == tag && row.id() != record.id())
        {
            return Err(StoreError::TagConflict {
                kind: R::KIND,
                tag: tag.to_string(),
            });
        }

        match record.id() {
            None => {
                let sequence = R::sequence(self.database);
                *sequence += 1;
                record.set_id(*sequence);
                R::rows_mut(self.database).push(record.clone());
            }
            Some(id) => {
                let row = R::rows_mut(self.database)
                    .iter_mut()
                    .find(|row| row.id() == Some(id))
                    .ok_or(StoreError::NotFound { kind: R::KIND, id })?;
                *row = record.clone();
            }
        }
        self.dirty = true;
        Ok(record)
    }

    fn delete_by_id(&mut self, id: u64) -> Result<(), StoreError> {
        let rows = R::rows_mut(self.database);
        let before = rows.len();
        rows.retain(|row| row.id() != Some(id));
        if rows.len() == before {
            return Err(StoreError::NotFound { kind: R::KIND, id });
        }
        self.dirty = true;
        Ok(())
    }
}

/// Serialized, transactional access to panel state.
#[derive(Debug)]
pub struct PanelStore {
    backend: Box<dyn Backend>,
    lock: Mutex<()>,
}

impl PanelStore {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            lock: Mutex::new(()),
        }
    }

    /// Store backed by a JSON file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(path))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    /// Run a read-only closure against a consistent snapshot.
    pub fn read<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _hold = self.backend.lock()?;
        let mut database = self.backend.load()?;
        let tx = Transaction::new(&mut database);
        f(&tx)
    }

    /// Run a closure as one all-or-nothing transaction.
    ///
    /// The store mutex and the backend lock are held from load through
    /// persist, so concurrent transactions (from this or any other store over
    /// the same storage) never observe or overwrite each other's state.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _hold = self.backend.lock()?;
        let mut database = self.backend.load()?;
        let mut tx = Transaction::new(&mut database);
        let value = f(&mut tx)?;
        if tx.is_dirty() {
            database.saved_at = chrono::Utc::now();
            self.backend.persist(&database)?;
        }
        Ok(value)
    }
}
