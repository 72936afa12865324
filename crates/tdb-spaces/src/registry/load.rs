use std::{collections::HashSet, sync::Arc};

use tdb_store::{EntryKey, SpaceEntry};

use super::SpaceRegistry;
use crate::{
    cache::{Bound, SpaceCaches},
    collab::{SpaceSlot, TraceSpace},
    error::SpaceError,
    naming,
    space::{AddressSpace, ExecutionContext, NO_ADDRESS_SPACE_NAME},
};

impl<M: TraceSpace> SpaceRegistry<M> {
    /// Populate the caches from every persisted entry.
    ///
    /// Entries whose space or context cannot be resolved are logged and skipped.
    pub fn load_spaces(&self) -> Result<(), SpaceError> {
        let loaded = {
            let mut caches = self.caches.write();
            self.load_into(&mut caches)
        };
        self.report_deferred();
        loaded
    }

    /// Drop all cached state and rebuild it from the entry table, then tell
    /// every resulting sub-space to invalidate its own cache.
    ///
    /// Sub-spaces whose row is still persisted are reused; any other handle
    /// held from before the call may now be stale.
    pub fn invalidate_cache(&self, _all: bool) -> Result<(), SpaceError> {
        let reloaded = {
            let mut caches = self.caches.write();
            self.store.invalidate_cache();
            caches.clear_spaces();
            self.by_object.lock().clear();
            self.load_into(&mut caches).map(|()| {
                for space in caches.all_spaces() {
                    space.invalidate_cache();
                }
            })
        };
        self.report_deferred();
        reloaded
    }

    fn load_into(&self, caches: &mut SpaceCaches<M>) -> Result<(), SpaceError> {
        let rows = match self.settle(self.store.entries(), self.store.table())? {
            Some(rows) => rows,
            None => return Ok(()),
        };
        let mut placed = HashSet::new();
        for (key, entry) in rows {
            if self.load_entry(caches, key, &entry)? {
                placed.insert(key);
            }
        }
        caches.retain_bindings(|key| placed.contains(key));
        Ok(())
    }

    /// Returns whether the entry ended up in a cache.
    fn load_entry(
        &self,
        caches: &mut SpaceCaches<M>,
        key: EntryKey,
        entry: &SpaceEntry,
    ) -> Result<bool, SpaceError> {
        let Some(space) = self.resolve_space(&entry.space_name) else {
            log::warn!(
                "space {} does not exist in trace (language={}), skipping row {key}",
                entry.space_name,
                self.language.name()
            );
            return Ok(false);
        };
        if space.is_register() && self.contexts.is_none() {
            log::warn!(
                "register space {} skipped: register spaces are not allowed without a context directory",
                entry.space_name
            );
            return Ok(false);
        }
        match entry.context() {
            Some(context_key) if space.is_register() => {
                let Some(context) = self.contexts.as_ref().and_then(|c| c.context(context_key))
                else {
                    log::warn!(
                        "context {context_key} of register space row {key} no longer exists, skipping"
                    );
                    return Ok(false);
                };
                let Some(bound) = self.reuse_or_create(caches, &space, Some(&context), key, entry)?
                else {
                    return Ok(false);
                };
                caches.insert_register(context_key, entry.frame_level, bound);
            }
            _ => {
                let Some(bound) = self.reuse_or_create(caches, &space, None, key, entry)? else {
                    return Ok(false);
                };
                caches.insert_memory(space, bound);
            }
        }
        Ok(true)
    }

    fn resolve_space(&self, name: &str) -> Option<AddressSpace> {
        if name == NO_ADDRESS_SPACE_NAME {
            return Some(AddressSpace::no_address());
        }
        self.spaces.space(name)
    }

    fn reuse_or_create(
        &self,
        caches: &SpaceCaches<M>,
        space: &AddressSpace,
        context: Option<&ExecutionContext>,
        key: EntryKey,
        entry: &SpaceEntry,
    ) -> Result<Option<Bound<M>>, SpaceError> {
        let bound = |instance| Bound {
            key,
            entry: entry.clone(),
            instance,
        };
        // A binding only counts for the row it was created for.
        if let Some(instance) = caches.binding(key, entry) {
            return Ok(Some(bound(instance)));
        }
        let slot = SpaceSlot {
            key,
            entry: entry.clone(),
            table_name: naming::table_name(&self.name, space, entry.context_key, entry.frame_level),
        };
        let created = self
            .instantiate(space, context, &slot)
            .map(|instance| bound(Arc::new(instance)));
        self.settle(created, &slot.table_name)
    }
}
