use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use tdb_store::{EntryKey, SpaceEntry};

use crate::{error::SpaceError, space::AddressSpace};

/// A sub-space together with the row it was instantiated for.
pub(crate) struct Bound<M> {
    pub(crate) key: EntryKey,
    pub(crate) entry: SpaceEntry,
    pub(crate) instance: Arc<M>,
}

/// The two primary caches plus the row bindings used to make reloads idempotent.
///
/// Lives behind the registry's main lock; callers only get clones of the
/// `Arc`s, never the maps.
pub(crate) struct SpaceCaches<M> {
    memory: BTreeMap<AddressSpace, Arc<M>>,
    registers: HashMap<(i64, u32), Arc<M>>,
    bindings: HashMap<EntryKey, (SpaceEntry, Arc<M>)>,
}

impl<M> Default for SpaceCaches<M> {
    fn default() -> Self {
        Self {
            memory: BTreeMap::new(),
            registers: HashMap::new(),
            bindings: HashMap::new(),
        }
    }
}

impl<M> SpaceCaches<M> {
    pub(crate) fn memory(&self, space: &AddressSpace) -> Option<Arc<M>> {
        self.memory.get(space).cloned()
    }

    pub(crate) fn register(&self, context_key: i64, frame_level: u32) -> Option<Arc<M>> {
        self.registers.get(&(context_key, frame_level)).cloned()
    }

    /// The instance created for row `key`, provided the row still holds `entry`.
    pub(crate) fn binding(&self, key: EntryKey, entry: &SpaceEntry) -> Option<Arc<M>> {
        self.bindings
            .get(&key)
            .filter(|(bound, _)| bound == entry)
            .map(|(_, instance)| instance.clone())
    }

    /// Returns the cached memory space, or runs `create` and caches what it yields.
    /// `create` yielding `None` leaves the slot empty.
    pub(crate) fn memory_or_create<F>(
        &mut self,
        space: &AddressSpace,
        create: F,
    ) -> Result<Option<Arc<M>>, SpaceError>
    where
        F: FnOnce() -> Result<Option<Bound<M>>, SpaceError>,
    {
        if let Some(existing) = self.memory.get(space) {
            return Ok(Some(existing.clone()));
        }
        let Some(bound) = create()? else {
            return Ok(None);
        };
        let instance = bound.instance.clone();
        self.insert_memory(space.clone(), bound);
        Ok(Some(instance))
    }

    pub(crate) fn register_or_create<F>(
        &mut self,
        context_key: i64,
        frame_level: u32,
        create: F,
    ) -> Result<Option<Arc<M>>, SpaceError>
    where
        F: FnOnce() -> Result<Option<Bound<M>>, SpaceError>,
    {
        if let Some(existing) = self.registers.get(&(context_key, frame_level)) {
            return Ok(Some(existing.clone()));
        }
        let Some(bound) = create()? else {
            return Ok(None);
        };
        let instance = bound.instance.clone();
        self.insert_register(context_key, frame_level, bound);
        Ok(Some(instance))
    }

    pub(crate) fn insert_memory(&mut self, space: AddressSpace, bound: Bound<M>) {
        self.memory.insert(space, bound.instance.clone());
        self.bindings.insert(bound.key, (bound.entry, bound.instance));
    }

    pub(crate) fn insert_register(&mut self, context_key: i64, frame_level: u32, bound: Bound<M>) {
        self.registers
            .insert((context_key, frame_level), bound.instance.clone());
        self.bindings.insert(bound.key, (bound.entry, bound.instance));
    }

    /// Empty both primary caches. Bindings survive so a reload can reuse them.
    pub(crate) fn clear_spaces(&mut self) {
        self.memory.clear();
        self.registers.clear();
    }

    pub(crate) fn retain_bindings(&mut self, keep: impl Fn(&EntryKey) -> bool) {
        self.bindings.retain(|key, _| keep(key));
    }

    pub(crate) fn memory_spaces(&self) -> Vec<Arc<M>> {
        self.memory.values().cloned().collect()
    }

    pub(crate) fn register_spaces(&self) -> Vec<Arc<M>> {
        self.registers.values().cloned().collect()
    }

    pub(crate) fn all_spaces(&self) -> Vec<Arc<M>> {
        self.memory
            .values()
            .chain(self.registers.values())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(key: u64, entry: SpaceEntry, value: u32) -> Bound<u32> {
        Bound {
            key: EntryKey(key),
            entry,
            instance: Arc::new(value),
        }
    }

    #[test]
    fn create_runs_only_on_miss() {
        let mut caches = SpaceCaches::<u32>::default();
        let ram = AddressSpace::memory(2, "ram");
        let first = caches
            .memory_or_create(&ram, || Ok(Some(bound(0, SpaceEntry::unbound("ram"), 7))))
            .unwrap()
            .unwrap();
        let second = caches
            .memory_or_create(&ram, || panic!("cached space must not be recreated"))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(caches.binding(EntryKey(0), &SpaceEntry::unbound("ram")).is_some());
    }

    #[test]
    fn absent_creation_leaves_slot_empty() {
        let mut caches = SpaceCaches::<u32>::default();
        let got = caches.register_or_create(1, 0, || Ok(None)).unwrap();
        assert!(got.is_none());
        assert!(caches.register(1, 0).is_none());
        assert!(caches.all_spaces().is_empty());
    }

    #[test]
    fn clear_keeps_bindings_until_pruned() {
        let mut caches = SpaceCaches::<u32>::default();
        let ram = SpaceEntry::unbound("ram");
        let regs = SpaceEntry::new("register", 1, 0);
        caches.insert_memory(AddressSpace::memory(2, "ram"), bound(0, ram.clone(), 1));
        caches.insert_register(1, 0, bound(1, regs.clone(), 2));
        caches.clear_spaces();
        assert!(caches.all_spaces().is_empty());
        assert!(caches.binding(EntryKey(1), &regs).is_some());

        caches.retain_bindings(|key| *key == EntryKey(0));
        assert!(caches.binding(EntryKey(0), &ram).is_some());
        assert!(caches.binding(EntryKey(1), &regs).is_none());
    }

    #[test]
    fn binding_is_only_reused_for_the_same_row() {
        let mut caches = SpaceCaches::<u32>::default();
        caches.insert_memory(
            AddressSpace::memory(2, "ram"),
            bound(0, SpaceEntry::unbound("ram"), 1),
        );
        assert!(caches.binding(EntryKey(0), &SpaceEntry::new("register", 1, 0)).is_none());
        assert_eq!(
            caches.binding(EntryKey(0), &SpaceEntry::unbound("ram")).as_deref(),
            Some(&1)
        );
    }
}
