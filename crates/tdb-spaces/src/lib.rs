//! Space registry for recorded traces.
//!
//! Maps memory spaces, per-context register banks and object-discovered
//! register containers to lazily created sub-spaces, persists the identity of
//! each one in an entry table, and rebuilds its caches from that table on
//! reload.

mod cache;
pub mod collab;
pub mod config;
pub mod error;
pub mod naming;
pub mod object;
pub mod registry;
pub mod space;

pub use collab::{
    AddressSpaceAuthority, ContextResolver, DbErrorHook, Language, LogErrorHook,
    SharedAddressSpaces, SharedContextResolver, SharedErrorHook, SharedLanguage, SpaceFactory,
    SpaceSlot, TraceSpace,
};
pub use config::{ENTRY_TABLE_SUFFIX, RegistryConfig, SpaceRegistryBuilder};
pub use error::SpaceError;
pub use naming::table_name;
pub use object::{CanonicalPath, NoObjectModel, ObjectId, ObjectModel, ObjectRef};
pub use registry::SpaceRegistry;
pub use space::{
    AddressSpace, ExecutionContext, NO_ADDRESS_SPACE_NAME, RegisterKey, SpaceKey, SpaceKind,
    StackFrame,
};
