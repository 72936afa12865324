//! Keyed record tables persisting the identity of trace spaces, plus filesystem and in-memory backends.

mod codec;
mod fs_store;
mod mem_store;

pub use codec::{from_cbor, to_canonical_cbor};
pub use fs_store::{FsEntryStore, FsStoreFactory};
pub use mem_store::{MemEntryStore, MemStoreFactory};

use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf, sync::Arc};

pub type StoreResult<T> = Result<T, StoreError>;
pub type SharedEntryStore = Arc<dyn EntryStore>;

/// Context key recorded for entries that are not bound to an execution context.
pub const NO_CONTEXT: i64 = -1;

/// Schema version written into every table header.
pub const ENTRY_SCHEMA_VERSION: u32 = 0;

/// One persisted `(space, context, frame)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceEntry {
    pub space_name: String,
    pub context_key: i64,
    pub frame_level: u32,
}

impl SpaceEntry {
    pub fn new(space_name: impl Into<String>, context_key: i64, frame_level: u32) -> Self {
        Self {
            space_name: space_name.into(),
            context_key,
            frame_level,
        }
    }

    /// Entry for a space that is not tied to any execution context.
    pub fn unbound(space_name: impl Into<String>) -> Self {
        Self::new(space_name, NO_CONTEXT, 0)
    }

    /// The owning context, if the entry records one.
    pub fn context(&self) -> Option<i64> {
        (self.context_key != NO_CONTEXT).then_some(self.context_key)
    }
}

/// Row key assigned by a table when an entry is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey(pub u64);

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only keyed record table of space entries.
///
/// Writers are expected to run inside a write transaction owned by the caller;
/// tables do not demarcate transactions themselves.
pub trait EntryStore: Send + Sync {
    /// Name of the backing table.
    fn table(&self) -> &str;

    /// Persist a new row and return its key.
    fn create(&self, entry: SpaceEntry) -> StoreResult<EntryKey>;

    /// All rows, in key order.
    fn entries(&self) -> StoreResult<Vec<(EntryKey, SpaceEntry)>>;

    /// Drop any cached rows so the next read observes the backing medium.
    fn invalidate_cache(&self);
}

/// Opens named entry tables.
pub trait EntryStoreFactory: Send + Sync {
    fn get_or_create_store(&self, table: &str) -> StoreResult<SharedEntryStore>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CBOR serialization error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("table corrupt: {0}")]
    Corrupt(String),
    #[error("table '{table}' has schema version {found}, expected {expected}")]
    Version {
        table: String,
        expected: u32,
        found: u32,
    },
}

impl StoreError {
    /// True when the failure is a schema mismatch rather than an environmental fault.
    pub fn is_version(&self) -> bool {
        matches!(self, StoreError::Version { .. })
    }
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source: err,
    }
}
