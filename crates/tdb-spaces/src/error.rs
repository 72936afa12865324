use tdb_store::StoreError;
use thiserror::Error;

/// Failures a caller of the registry can observe.
///
/// Environmental store failures never show up here; they go to the
/// registry's [`DbErrorHook`](crate::DbErrorHook) instead.
#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("execution context {0} does not belong to this trace")]
    NotMine(i64),
    #[error("schema invariant violated for '{table}': {source}")]
    SchemaInvariant {
        table: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to open space table '{table}': {source}")]
    Open {
        table: String,
        #[source]
        source: StoreError,
    },
}
