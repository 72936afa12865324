use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tdb_spaces::{AddressSpace, DbErrorHook, ExecutionContext, SpaceFactory, SpaceSlot, TraceSpace};
use tdb_store::{
    ENTRY_SCHEMA_VERSION, EntryKey, EntryStore, EntryStoreFactory, MemEntryStore, MemStoreFactory,
    SharedEntryStore, SpaceEntry, StoreError, StoreResult,
};

/// Kind of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Io,
    Version,
}

impl Failure {
    fn into_error(self, what: &str) -> StoreError {
        match self {
            Failure::Io => StoreError::Io {
                path: format!("memory://{what}").into(),
                source: io::Error::other("injected failure"),
            },
            Failure::Version => StoreError::Version {
                table: what.to_string(),
                expected: ENTRY_SCHEMA_VERSION,
                found: ENTRY_SCHEMA_VERSION + 1,
            },
        }
    }
}

/// Sub-space produced by [`RecordingFactory`].
#[derive(Debug)]
pub struct TestSpace {
    /// Creation order across the factory's lifetime.
    pub serial: usize,
    pub space: AddressSpace,
    pub context: Option<i64>,
    pub slot: SpaceSlot,
    invalidations: AtomicUsize,
}

impl TestSpace {
    pub fn table_name(&self) -> &str {
        &self.slot.table_name
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl TraceSpace for TestSpace {
    fn invalidate_cache(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory that records every sub-space it builds and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingFactory {
    created: AtomicUsize,
    fail_next: Mutex<Option<Failure>>,
    delay: Mutex<Option<Duration>>,
    tables: Mutex<Vec<String>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Table names in creation order.
    pub fn tables(&self) -> Vec<String> {
        self.tables.lock().clone()
    }

    pub fn fail_next(&self, failure: Failure) {
        *self.fail_next.lock() = Some(failure);
    }

    /// Sleep inside every creation, widening race windows in concurrency tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    fn build(
        &self,
        space: &AddressSpace,
        context: Option<&ExecutionContext>,
        slot: &SpaceSlot,
    ) -> StoreResult<TestSpace> {
        if let Some(failure) = self.fail_next.lock().take() {
            return Err(failure.into_error(&slot.table_name));
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let serial = self.created.fetch_add(1, Ordering::SeqCst);
        self.tables.lock().push(slot.table_name.clone());
        Ok(TestSpace {
            serial,
            space: space.clone(),
            context: context.map(|c| c.key),
            slot: slot.clone(),
            invalidations: AtomicUsize::new(0),
        })
    }
}

impl SpaceFactory<TestSpace> for RecordingFactory {
    fn create_space(&self, space: &AddressSpace, slot: &SpaceSlot) -> StoreResult<TestSpace> {
        self.build(space, None, slot)
    }

    fn create_register_space(
        &self,
        space: &AddressSpace,
        context: &ExecutionContext,
        slot: &SpaceSlot,
    ) -> StoreResult<TestSpace> {
        self.build(space, Some(context), slot)
    }
}

/// Keeps the messages of every reported database error.
#[derive(Debug, Default)]
pub struct RecordingErrorHook {
    errors: Mutex<Vec<String>>,
}

impl RecordingErrorHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl DbErrorHook for RecordingErrorHook {
    fn db_error(&self, err: &StoreError) {
        self.errors.lock().push(err.to_string());
    }
}

/// Entry table that fails on demand.
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemEntryStore,
    fail_next: Arc<Mutex<Option<Failure>>>,
}

impl EntryStore for FlakyStore {
    fn table(&self) -> &str {
        self.inner.table()
    }

    fn create(&self, entry: SpaceEntry) -> StoreResult<EntryKey> {
        if let Some(failure) = self.fail_next.lock().take() {
            return Err(failure.into_error(self.inner.table()));
        }
        self.inner.create(entry)
    }

    fn entries(&self) -> StoreResult<Vec<(EntryKey, SpaceEntry)>> {
        self.inner.entries()
    }

    fn invalidate_cache(&self) {
        self.inner.invalidate_cache();
    }
}

/// Hands out [`FlakyStore`]s over shared in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct FlakyStoreFactory {
    tables: MemStoreFactory,
    fail_next: Arc<Mutex<Option<Failure>>>,
}

impl FlakyStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `create` on any table handed out fails.
    pub fn fail_next_create(&self, failure: Failure) {
        *self.fail_next.lock() = Some(failure);
    }

    pub fn table(&self, table: &str) -> Option<MemEntryStore> {
        self.tables.table(table)
    }
}

impl EntryStoreFactory for FlakyStoreFactory {
    fn get_or_create_store(&self, table: &str) -> StoreResult<SharedEntryStore> {
        self.tables.get_or_create_store(table)?;
        let inner = self
            .tables
            .table(table)
            .unwrap_or_else(|| MemEntryStore::new(table));
        Ok(Arc::new(FlakyStore {
            inner,
            fail_next: self.fail_next.clone(),
        }))
    }
}
