use std::{
    io,
    sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tdb_spaces::{AddressSpace, AddressSpaceAuthority, Language, SpaceKind};
use tdb_store::{StoreError, StoreResult};

pub const REGISTER_SPACE_ID: u32 = 1;
pub const RAM_SPACE_ID: u32 = 2;

/// Fixed architecture with a single `register` space.
#[derive(Debug, Clone)]
pub struct TestLanguage {
    name: String,
    register: AddressSpace,
}

impl TestLanguage {
    pub fn new() -> Self {
        Self {
            name: "x86:LE:64:default".into(),
            register: AddressSpace::register(REGISTER_SPACE_ID, "register"),
        }
    }
}

impl Default for TestLanguage {
    fn default() -> Self {
        Self::new()
    }
}

impl Language for TestLanguage {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_space(&self) -> AddressSpace {
        self.register.clone()
    }
}

/// Address-space directory that counts every call made on it.
#[derive(Debug)]
pub struct TestAddressSpaces {
    spaces: Mutex<IndexMap<String, AddressSpace>>,
    next_id: AtomicU32,
    calls: AtomicUsize,
    overlays_created: AtomicUsize,
    fail_overlays: AtomicBool,
}

impl TestAddressSpaces {
    /// `const`, `register`, `ram`, `unique` and `stack`.
    pub fn new() -> Self {
        let defaults = [
            AddressSpace::new(0, "const", SpaceKind::Constant),
            AddressSpace::register(REGISTER_SPACE_ID, "register"),
            AddressSpace::memory(RAM_SPACE_ID, "ram"),
            AddressSpace::new(3, "unique", SpaceKind::Unique),
            AddressSpace::new(4, "stack", SpaceKind::Stack),
        ];
        Self {
            spaces: Mutex::new(
                defaults
                    .into_iter()
                    .map(|space| (space.name().to_string(), space))
                    .collect(),
            ),
            next_id: AtomicU32::new(100),
            calls: AtomicUsize::new(0),
            overlays_created: AtomicUsize::new(0),
            fail_overlays: AtomicBool::new(false),
        }
    }

    /// Look a space up without counting the call.
    pub fn get(&self, name: &str) -> Option<AddressSpace> {
        self.spaces.lock().get(name).cloned()
    }

    pub fn add(&self, space: AddressSpace) {
        self.spaces.lock().insert(space.name().to_string(), space);
    }

    pub fn remove(&self, name: &str) -> Option<AddressSpace> {
        self.spaces.lock().shift_remove(name)
    }

    /// Calls made through [`AddressSpaceAuthority`].
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn overlays_created(&self) -> usize {
        self.overlays_created.load(Ordering::SeqCst)
    }

    pub fn set_fail_overlays(&self, fail: bool) {
        self.fail_overlays.store(fail, Ordering::SeqCst);
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for TestAddressSpaces {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpaceAuthority for TestAddressSpaces {
    fn space(&self, name: &str) -> Option<AddressSpace> {
        self.count();
        self.get(name)
    }

    fn is_valid(&self, space: &AddressSpace) -> bool {
        self.count();
        space.is_no_address() || self.get(space.name()).as_ref() == Some(space)
    }

    fn get_or_create_overlay(&self, name: &str, base: &AddressSpace) -> StoreResult<AddressSpace> {
        self.count();
        if self.fail_overlays.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: format!("memory://overlays/{name}").into(),
                source: io::Error::other("overlay table unavailable"),
            });
        }
        let mut spaces = self.spaces.lock();
        if let Some(existing) = spaces.get(name) {
            return Ok(existing.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let overlay = AddressSpace::overlay(id, name, base);
        spaces.insert(name.to_string(), overlay.clone());
        self.overlays_created.fetch_add(1, Ordering::SeqCst);
        log::debug!("created overlay {name} on {base}");
        Ok(overlay)
    }
}
