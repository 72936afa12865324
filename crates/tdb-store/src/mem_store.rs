use crate::{EntryKey, EntryStore, EntryStoreFactory, SharedEntryStore, SpaceEntry, StoreResult};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<EntryKey, SpaceEntry>,
    next_key: u64,
}

/// In-memory table. Clones share rows, so a clone acts as a second writer.
#[derive(Clone)]
pub struct MemEntryStore {
    table: Arc<str>,
    inner: Arc<RwLock<Table>>,
    invalidations: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MemEntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemEntryStore")
            .field("table", &self.table)
            .field("rows", &self.inner.read().rows.len())
            .finish()
    }
}

impl MemEntryStore {
    pub fn new(table: impl Into<Arc<str>>) -> Self {
        Self {
            table: table.into(),
            inner: Arc::new(RwLock::new(Table::default())),
            invalidations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a row, as an undo of its creating transaction would.
    pub fn remove(&self, key: EntryKey) -> Option<SpaceEntry> {
        self.inner.write().rows.remove(&key)
    }

    /// Number of times `invalidate_cache` has been called.
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl EntryStore for MemEntryStore {
    fn table(&self) -> &str {
        &self.table
    }

    fn create(&self, entry: SpaceEntry) -> StoreResult<EntryKey> {
        let mut guard = self.inner.write();
        let key = EntryKey(guard.next_key);
        guard.next_key += 1;
        guard.rows.insert(key, entry);
        Ok(key)
    }

    fn entries(&self) -> StoreResult<Vec<(EntryKey, SpaceEntry)>> {
        let guard = self.inner.read();
        Ok(guard
            .rows
            .iter()
            .map(|(key, entry)| (*key, entry.clone()))
            .collect())
    }

    fn invalidate_cache(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out one shared [`MemEntryStore`] per table name.
#[derive(Debug, Clone, Default)]
pub struct MemStoreFactory {
    tables: Arc<Mutex<HashMap<String, MemEntryStore>>>,
}

impl MemStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on an already opened table.
    pub fn table(&self, table: &str) -> Option<MemEntryStore> {
        self.tables.lock().get(table).cloned()
    }
}

impl EntryStoreFactory for MemStoreFactory {
    fn get_or_create_store(&self, table: &str) -> StoreResult<SharedEntryStore> {
        let store = self
            .tables
            .lock()
            .entry(table.to_string())
            .or_insert_with(|| MemEntryStore::new(table))
            .clone();
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_monotonic_and_entries_ordered() {
        let store = MemEntryStore::new("MemorySpaces");
        let a = store.create(SpaceEntry::unbound("ram")).expect("create");
        let b = store.create(SpaceEntry::new("register", 3, 1)).expect("create");
        assert!(a < b);

        let entries = store.entries().expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (a, SpaceEntry::unbound("ram")));
        assert_eq!(entries[1].1.context(), Some(3));
    }

    #[test]
    fn removed_keys_are_not_reused() {
        let store = MemEntryStore::new("t");
        let a = store.create(SpaceEntry::unbound("ram")).unwrap();
        store.remove(a);
        let b = store.create(SpaceEntry::unbound("ram")).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn factory_shares_tables_by_name() {
        let factory = MemStoreFactory::new();
        let first = factory.get_or_create_store("MemorySpaces").unwrap();
        first.create(SpaceEntry::unbound("ram")).unwrap();
        let second = factory.get_or_create_store("MemorySpaces").unwrap();
        assert_eq!(second.entries().unwrap().len(), 1);
        assert!(factory.get_or_create_store("Other").unwrap().entries().unwrap().is_empty());
        assert_eq!(factory.table("MemorySpaces").map(|t| t.len()), Some(1));
    }
}
