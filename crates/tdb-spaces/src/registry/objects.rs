//! Register banks discovered through the object tree.
//!
//! A register container found under an object gets an overlay of the
//! canonical register space named after the container's canonical path. From
//! then on it is stored exactly like a named memory space.

use std::sync::Arc;

use super::SpaceRegistry;
use crate::{collab::TraceSpace, error::SpaceError, object::ObjectRef};

impl<M: TraceSpace> SpaceRegistry<M> {
    pub(super) fn get_for_register_object(
        &self,
        object: &ObjectRef,
        frame_level: u32,
        create_if_absent: bool,
    ) -> Result<Option<Arc<M>>, SpaceError> {
        let cached = self.by_object.lock().get(&(object.id, frame_level)).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        // The object lock is not held while resolving; a racing thread may
        // repeat the work, but rows are only written under the main lock.
        let Some(container) = self.register_container(object, frame_level) else {
            return Ok(None);
        };
        let found = self.space_for_container(&container, create_if_absent)?;
        if let Some(space) = &found {
            self.by_object
                .lock()
                .insert((object.id, frame_level), space.clone());
        }
        Ok(found)
    }

    fn register_container(&self, object: &ObjectRef, frame_level: u32) -> Option<ObjectRef> {
        if self.objects.is_register_container(object) {
            return Some(object.clone());
        }
        self.objects.query_register_container(object, frame_level)
    }

    fn space_for_container(
        &self,
        container: &ObjectRef,
        create_if_absent: bool,
    ) -> Result<Option<Arc<M>>, SpaceError> {
        let name = container.path.to_string();
        if !create_if_absent {
            let Some(space) = self.spaces.space(&name) else {
                return Ok(None);
            };
            self.check_space(&space)?;
            return Ok(self.caches.read().memory(&space));
        }
        let mut caches = self.caches.write();
        let base = self.language.register_space();
        let overlay = match self.settle(self.spaces.get_or_create_overlay(&name, &base), &name)? {
            Some(overlay) => overlay,
            None => return Ok(None),
        };
        self.check_space(&overlay)?;
        self.memory_or_create(&mut caches, &overlay)
    }
}
