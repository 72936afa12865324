//! Seams between the registry and the rest of the trace database.

use std::sync::Arc;

use tdb_store::{EntryKey, SpaceEntry, StoreError, StoreResult};

use crate::space::{AddressSpace, ExecutionContext};

pub type SharedContextResolver = Arc<dyn ContextResolver>;
pub type SharedLanguage = Arc<dyn Language>;
pub type SharedAddressSpaces = Arc<dyn AddressSpaceAuthority>;
pub type SharedErrorHook = Arc<dyn DbErrorHook>;

/// Directory of execution contexts (threads) in the trace.
pub trait ContextResolver: Send + Sync {
    fn context(&self, key: i64) -> Option<ExecutionContext>;

    /// Whether `context` was handed out by this directory.
    fn is_mine(&self, context: &ExecutionContext) -> bool {
        self.context(context.key).is_some_and(|own| own == *context)
    }
}

/// Architecture descriptor of the traced target.
pub trait Language: Send + Sync {
    fn name(&self) -> &str;

    /// The single canonical register space.
    fn register_space(&self) -> AddressSpace;
}

/// Validates spaces and is the only party allowed to mint overlays.
pub trait AddressSpaceAuthority: Send + Sync {
    fn space(&self, name: &str) -> Option<AddressSpace>;

    fn is_valid(&self, space: &AddressSpace) -> bool;

    fn get_or_create_overlay(&self, name: &str, base: &AddressSpace) -> StoreResult<AddressSpace>;
}

/// The persisted row a new sub-space is backed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceSlot {
    pub key: EntryKey,
    pub entry: SpaceEntry,
    pub table_name: String,
}

/// Every sub-space the registry manages.
pub trait TraceSpace: Send + Sync {
    /// Drop whatever the sub-space cached from its table.
    fn invalidate_cache(&self);
}

/// Builds concrete sub-spaces for the registry.
///
/// `StoreError::Version` from either method is treated as a broken invariant;
/// any other error is reported to the [`DbErrorHook`] and the space is left absent.
pub trait SpaceFactory<M>: Send + Sync {
    fn create_space(&self, space: &AddressSpace, slot: &SpaceSlot) -> StoreResult<M>;

    fn create_register_space(
        &self,
        space: &AddressSpace,
        context: &ExecutionContext,
        slot: &SpaceSlot,
    ) -> StoreResult<M>;
}

/// Receives non-fatal database errors.
///
/// Called once the registry has released its locks; the hook may query the
/// registry again.
pub trait DbErrorHook: Send + Sync {
    fn db_error(&self, err: &StoreError);
}

/// Reports database errors through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHook;

impl DbErrorHook for LogErrorHook {
    fn db_error(&self, err: &StoreError) {
        log::error!("trace database error: {err}");
    }
}
