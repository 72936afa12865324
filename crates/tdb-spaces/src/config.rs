use std::{fmt, sync::Arc};

use tdb_store::EntryStoreFactory;

use crate::{
    collab::{
        LogErrorHook, SharedAddressSpaces, SharedContextResolver, SharedErrorHook, SharedLanguage,
        SpaceFactory, TraceSpace,
    },
    error::SpaceError,
    object::{NoObjectModel, ObjectModel},
    registry::{Collaborators, SpaceRegistry},
};

/// Suffix appended to the registry name to form its entry table name.
pub const ENTRY_TABLE_SUFFIX: &str = "Spaces";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Manager name; prefixes every table the registry derives.
    pub name: String,
    /// Run `load_spaces` as part of `build`.
    pub eager_load: bool,
}

impl RegistryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            eager_load: true,
        }
    }

    pub fn entry_table(&self) -> String {
        format!("{}{ENTRY_TABLE_SUFFIX}", self.name)
    }
}

pub struct SpaceRegistryBuilder<M> {
    config: RegistryConfig,
    factory: Arc<dyn SpaceFactory<M>>,
    language: SharedLanguage,
    spaces: SharedAddressSpaces,
    contexts: Option<SharedContextResolver>,
    objects: Arc<dyn ObjectModel>,
    errors: SharedErrorHook,
}

impl<M> fmt::Debug for SpaceRegistryBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceRegistryBuilder")
            .field("config", &self.config)
            .field("language", &self.language.name())
            .field("contexts", &self.contexts.as_ref().map(|_| "<resolver>"))
            .field("objects", &self.objects.has_schema())
            .finish()
    }
}

impl<M: TraceSpace> SpaceRegistryBuilder<M> {
    pub fn new(
        name: impl Into<String>,
        language: SharedLanguage,
        spaces: SharedAddressSpaces,
        factory: Arc<dyn SpaceFactory<M>>,
    ) -> Self {
        Self {
            config: RegistryConfig::new(name),
            factory,
            language,
            spaces,
            contexts: None,
            objects: Arc::new(NoObjectModel),
            errors: Arc::new(LogErrorHook),
        }
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Enables register spaces. Without a resolver, register lookups return nothing.
    pub fn with_context_resolver(mut self, contexts: SharedContextResolver) -> Self {
        self.contexts = Some(contexts);
        self
    }

    pub fn with_object_model(mut self, objects: Arc<dyn ObjectModel>) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_error_hook(mut self, errors: SharedErrorHook) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_eager_load(mut self, enable: bool) -> Self {
        self.config.eager_load = enable;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Open the entry table through `stores` and assemble the registry.
    pub fn build(self, stores: &dyn EntryStoreFactory) -> Result<SpaceRegistry<M>, SpaceError> {
        let table = self.config.entry_table();
        let store = stores
            .get_or_create_store(&table)
            .map_err(|source| SpaceError::Open { table, source })?;
        let registry = SpaceRegistry::from_parts(
            self.config.name,
            Collaborators {
                store,
                factory: self.factory,
                contexts: self.contexts,
                language: self.language,
                spaces: self.spaces,
                objects: self.objects,
                errors: self.errors,
            },
        );
        if self.config.eager_load {
            registry.load_spaces()?;
        }
        Ok(registry)
    }
}
