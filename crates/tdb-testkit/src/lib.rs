//! Deterministic fakes for exercising the space registry.
//!
//! - [`TestLanguage`]/[`TestAddressSpaces`]: architecture and address-space directory
//! - [`TestContexts`]: execution-context directory
//! - [`TestObjects`]: object tree with register containers
//! - [`RecordingFactory`]: builds [`TestSpace`]s and counts them
//! - [`Fixture`]: all of the above wired into a registry builder

mod arch;
mod contexts;
mod factory;
mod objects;

pub use arch::{RAM_SPACE_ID, REGISTER_SPACE_ID, TestAddressSpaces, TestLanguage};
pub use contexts::TestContexts;
pub use factory::{
    Failure, FlakyStore, FlakyStoreFactory, RecordingErrorHook, RecordingFactory, TestSpace,
};
pub use objects::{STACK_KEY, TestObjects};

use std::sync::Arc;

use tdb_spaces::{AddressSpace, SpaceError, SpaceRegistry, SpaceRegistryBuilder};
use tdb_store::MemEntryStore;

/// Name every fixture registry is built with.
pub const MANAGER: &str = "Memory";

pub struct Fixture {
    pub language: Arc<TestLanguage>,
    pub spaces: Arc<TestAddressSpaces>,
    pub contexts: Arc<TestContexts>,
    pub objects: Arc<TestObjects>,
    pub factory: Arc<RecordingFactory>,
    pub errors: Arc<RecordingErrorHook>,
    pub stores: FlakyStoreFactory,
}

impl Fixture {
    /// Thread/frame addressed trace.
    pub fn new() -> Self {
        Self::with_objects(TestObjects::new(false))
    }

    /// Object addressed trace.
    pub fn object_addressed() -> Self {
        Self::with_objects(TestObjects::new(true))
    }

    fn with_objects(objects: TestObjects) -> Self {
        Self {
            language: Arc::new(TestLanguage::new()),
            spaces: Arc::new(TestAddressSpaces::new()),
            contexts: Arc::new(TestContexts::new()),
            objects: Arc::new(objects),
            factory: Arc::new(RecordingFactory::new()),
            errors: Arc::new(RecordingErrorHook::new()),
            stores: FlakyStoreFactory::new(),
        }
    }

    /// Builder without a context directory: register spaces disabled.
    pub fn bare_builder(&self) -> SpaceRegistryBuilder<TestSpace> {
        SpaceRegistryBuilder::new(
            MANAGER,
            self.language.clone(),
            self.spaces.clone(),
            self.factory.clone(),
        )
        .with_object_model(self.objects.clone())
        .with_error_hook(self.errors.clone())
    }

    pub fn builder(&self) -> SpaceRegistryBuilder<TestSpace> {
        self.bare_builder()
            .with_context_resolver(self.contexts.clone())
    }

    pub fn try_registry(&self) -> Result<SpaceRegistry<TestSpace>, SpaceError> {
        self.builder().build(&self.stores)
    }

    pub fn registry(&self) -> SpaceRegistry<TestSpace> {
        self.try_registry().expect("build registry")
    }

    /// The entry table fixture registries persist into.
    pub fn table(&self) -> MemEntryStore {
        self.stores
            .table(&format!("{MANAGER}{}", tdb_spaces::ENTRY_TABLE_SUFFIX))
            .unwrap_or_else(|| MemEntryStore::new("unopened"))
    }

    pub fn ram(&self) -> AddressSpace {
        self.spaces.get("ram").expect("ram space")
    }

    pub fn register_space(&self) -> AddressSpace {
        self.spaces.get("register").expect("register space")
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
