//! The space registry: resolves trace address spaces to lazily created sub-spaces.
//!
//! # Locking
//!
//! One reader/writer lock guards both primary caches and every
//! check-persist-instantiate sequence, so a key is never created twice.
//! Lookups that do not create take the shared side only for the map read.
//! The object-keyed cache has its own mutex; two threads may both resolve the
//! same object, but the row is only ever written under the main lock.
//!
//! Creating paths append to the entry table. Callers must already hold a
//! write transaction on the trace database.
//!
//! Store errors met while a registry lock is held are queued and handed to the
//! [`DbErrorHook`](crate::DbErrorHook) after the lock is released, so a hook
//! may call back into the registry.

mod load;
mod objects;

use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RwLock};
use tdb_store::{SharedEntryStore, SpaceEntry, StoreError};

use crate::{
    cache::{Bound, SpaceCaches},
    collab::{
        SharedAddressSpaces, SharedContextResolver, SharedErrorHook, SharedLanguage, SpaceFactory,
        SpaceSlot, TraceSpace,
    },
    error::SpaceError,
    naming,
    object::{ObjectId, ObjectModel},
    space::{AddressSpace, ExecutionContext, RegisterKey, SpaceKey, StackFrame},
};

pub struct SpaceRegistry<M> {
    name: String,
    store: SharedEntryStore,
    factory: Arc<dyn SpaceFactory<M>>,
    contexts: Option<SharedContextResolver>,
    language: SharedLanguage,
    spaces: SharedAddressSpaces,
    objects: Arc<dyn ObjectModel>,
    errors: SharedErrorHook,
    caches: RwLock<SpaceCaches<M>>,
    /// Keyed by object and frame level; a thread object resolves to a
    /// different container per frame.
    by_object: Mutex<HashMap<(ObjectId, u32), Arc<M>>>,
    deferred: Mutex<Vec<StoreError>>,
}

impl<M> std::fmt::Debug for SpaceRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceRegistry")
            .field("name", &self.name)
            .field("table", &self.store.table())
            .field("language", &self.language.name())
            .field("register_support", &self.contexts.is_some())
            .finish()
    }
}

pub(crate) struct Collaborators<M> {
    pub(crate) store: SharedEntryStore,
    pub(crate) factory: Arc<dyn SpaceFactory<M>>,
    pub(crate) contexts: Option<SharedContextResolver>,
    pub(crate) language: SharedLanguage,
    pub(crate) spaces: SharedAddressSpaces,
    pub(crate) objects: Arc<dyn ObjectModel>,
    pub(crate) errors: SharedErrorHook,
}

impl<M: TraceSpace> SpaceRegistry<M> {
    pub(crate) fn from_parts(name: String, parts: Collaborators<M>) -> Self {
        Self {
            name,
            store: parts.store,
            factory: parts.factory,
            contexts: parts.contexts,
            language: parts.language,
            spaces: parts.spaces,
            objects: parts.objects,
            errors: parts.errors,
            caches: RwLock::new(SpaceCaches::default()),
            by_object: Mutex::new(HashMap::new()),
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> &SharedLanguage {
        &self.language
    }

    pub fn store(&self) -> &SharedEntryStore {
        &self.store
    }

    pub fn has_register_support(&self) -> bool {
        self.contexts.is_some()
    }

    /// Resolve a request to the memory or register sub-space it names.
    pub fn get(&self, key: &SpaceKey, create_if_absent: bool) -> Result<Option<Arc<M>>, SpaceError> {
        match &key.context {
            Some(context) => self.get_for_register_space(context, key.frame_level, create_if_absent),
            None => self.get_for_space(&key.space, create_if_absent),
        }
    }

    /// Memory, register-overlay or no-address sub-space for `space`.
    pub fn get_for_space(
        &self,
        space: &AddressSpace,
        create_if_absent: bool,
    ) -> Result<Option<Arc<M>>, SpaceError> {
        self.check_space(space)?;
        if !create_if_absent {
            return Ok(self.caches.read().memory(space));
        }
        let created = {
            let mut caches = self.caches.write();
            self.memory_or_create(&mut caches, space)
        };
        self.report_deferred();
        created
    }

    /// Register sub-space for a context at a frame level.
    ///
    /// Object-addressed traces resolve through the context's backing object.
    pub fn get_for_register_space(
        &self,
        context: &ExecutionContext,
        frame_level: u32,
        create_if_absent: bool,
    ) -> Result<Option<Arc<M>>, SpaceError> {
        let Some(contexts) = &self.contexts else {
            log::warn!(
                "register space requested for context {} but {} has no context directory",
                context.key,
                self.name
            );
            return Ok(None);
        };
        if !contexts.is_mine(context) {
            return Err(SpaceError::NotMine(context.key));
        }
        let key = self.register_key(context, frame_level)?;
        self.get_register(&key, create_if_absent)
    }

    /// Register sub-space for a stack frame handle.
    pub fn get_for_frame(
        &self,
        frame: &StackFrame,
        create_if_absent: bool,
    ) -> Result<Option<Arc<M>>, SpaceError> {
        match frame {
            // the frame object already pins the frame, so search from level 0
            StackFrame::Object(object) => self.get_register(
                &RegisterKey::ByObject {
                    object: object.clone(),
                    frame_level: 0,
                },
                create_if_absent,
            ),
            StackFrame::Level { context, level } => {
                self.get_for_register_space(context, *level, create_if_absent)
            }
        }
    }

    /// Dispatch on how the register bank is identified.
    pub fn get_register(
        &self,
        key: &RegisterKey,
        create_if_absent: bool,
    ) -> Result<Option<Arc<M>>, SpaceError> {
        if self.contexts.is_none() {
            log::warn!("register spaces are disabled for {}: {key:?}", self.name);
            return Ok(None);
        }
        let found = match key {
            RegisterKey::ByContextFrame {
                context,
                frame_level,
            } => self.get_for_context_frame(context, *frame_level, create_if_absent),
            RegisterKey::ByObject {
                object,
                frame_level,
            } => self.get_for_register_object(object, *frame_level, create_if_absent),
        };
        self.report_deferred();
        found
    }

    /// Every live sub-space, memory spaces first in address-space order.
    pub fn active_spaces(&self) -> Vec<Arc<M>> {
        self.caches.read().all_spaces()
    }

    pub fn active_memory_spaces(&self) -> Vec<Arc<M>> {
        self.caches.read().memory_spaces()
    }

    pub fn active_register_spaces(&self) -> Vec<Arc<M>> {
        self.caches.read().register_spaces()
    }

    fn register_key(
        &self,
        context: &ExecutionContext,
        frame_level: u32,
    ) -> Result<RegisterKey, SpaceError> {
        if !self.objects.has_schema() {
            return Ok(RegisterKey::ByContextFrame {
                context: context.clone(),
                frame_level,
            });
        }
        match &context.object {
            Some(object) => Ok(RegisterKey::ByObject {
                object: object.clone(),
                frame_level,
            }),
            None => Err(SpaceError::InvalidArgument(format!(
                "context {} has no backing object in an object-addressed trace",
                context.key
            ))),
        }
    }

    fn check_space(&self, space: &AddressSpace) -> Result<(), SpaceError> {
        if !self.spaces.is_valid(space) {
            return Err(SpaceError::InvalidArgument(format!(
                "space {space} is not part of this trace"
            )));
        }
        if !space.is_memory() && !space.is_register() && !space.is_no_address() {
            return Err(SpaceError::InvalidArgument(format!(
                "space {space} must be a memory, register, or no-address space"
            )));
        }
        Ok(())
    }

    fn get_for_context_frame(
        &self,
        context: &ExecutionContext,
        frame_level: u32,
        create_if_absent: bool,
    ) -> Result<Option<Arc<M>>, SpaceError> {
        if !create_if_absent {
            return Ok(self.caches.read().register(context.key, frame_level));
        }
        let mut caches = self.caches.write();
        caches.register_or_create(context.key, frame_level, || {
            let space = self.language.register_space();
            let entry = SpaceEntry::new(space.name(), context.key, frame_level);
            self.create_bound(&space, Some(context), entry)
        })
    }

    /// Get-or-create a memory-cache slot. The caller holds the write lock.
    fn memory_or_create(
        &self,
        caches: &mut SpaceCaches<M>,
        space: &AddressSpace,
    ) -> Result<Option<Arc<M>>, SpaceError> {
        caches.memory_or_create(space, || {
            self.create_bound(space, None, SpaceEntry::unbound(space.name()))
        })
    }

    /// Persist `entry` and instantiate its sub-space.
    fn create_bound(
        &self,
        space: &AddressSpace,
        context: Option<&ExecutionContext>,
        entry: SpaceEntry,
    ) -> Result<Option<Bound<M>>, SpaceError> {
        let table_name =
            naming::table_name(&self.name, space, entry.context_key, entry.frame_level);
        let created = self.store.create(entry.clone()).and_then(|key| {
            let slot = SpaceSlot {
                key,
                entry: entry.clone(),
                table_name: table_name.clone(),
            };
            log::debug!("creating sub-space {} for row {key}", slot.table_name);
            self.instantiate(space, context, &slot).map(|instance| Bound {
                key,
                entry,
                instance: Arc::new(instance),
            })
        });
        self.settle(created, &table_name)
    }

    fn instantiate(
        &self,
        space: &AddressSpace,
        context: Option<&ExecutionContext>,
        slot: &SpaceSlot,
    ) -> Result<M, StoreError> {
        match context {
            Some(context) => self.factory.create_register_space(space, context, slot),
            None => self.factory.create_space(space, slot),
        }
    }

    /// Version errors are broken invariants; every other store error is
    /// queued for the error hook and leaves the result absent.
    fn settle<T>(&self, result: Result<T, StoreError>, table: &str) -> Result<Option<T>, SpaceError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_version() => Err(SpaceError::SchemaInvariant {
                table: table.to_string(),
                source: err,
            }),
            Err(err) => {
                self.deferred.lock().push(err);
                Ok(None)
            }
        }
    }

    /// Hand queued store errors to the hook. Must not be called with a
    /// registry lock held.
    fn report_deferred(&self) {
        let pending = std::mem::take(&mut *self.deferred.lock());
        for err in &pending {
            self.errors.db_error(err);
        }
    }
}
