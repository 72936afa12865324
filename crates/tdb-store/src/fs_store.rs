use crate::{
    ENTRY_SCHEMA_VERSION, EntryKey, EntryStore, EntryStoreFactory, SharedEntryStore, SpaceEntry,
    StoreError, StoreResult,
    codec::{from_cbor, to_canonical_cbor},
    io_error,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

const TABLE_DIR: &str = "spaces";
const TABLE_EXT: &str = "log";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum DiskRecord {
    Header { version: u32 },
    Row { key: EntryKey, entry: SpaceEntry },
}

#[derive(Default)]
struct FsState {
    rows: Option<Vec<(EntryKey, SpaceEntry)>>,
}

/// Filesystem-backed table: an append-only file of length-prefixed canonical CBOR records.
pub struct FsEntryStore {
    table: String,
    path: PathBuf,
    state: Mutex<FsState>,
}

impl fmt::Debug for FsEntryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsEntryStore")
            .field("table", &self.table)
            .field("path", &self.path)
            .finish()
    }
}

impl FsEntryStore {
    pub fn open(root: impl AsRef<Path>, table: &str) -> StoreResult<Self> {
        let dir = root.as_ref().join(TABLE_DIR);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        let path = dir.join(format!("{table}.{TABLE_EXT}"));
        let fresh = match fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(err) if err.kind() == ErrorKind::NotFound => true,
            Err(err) => return Err(io_error(&path, err)),
        };
        if fresh {
            append_record(
                &path,
                &DiskRecord::Header {
                    version: ENTRY_SCHEMA_VERSION,
                },
            )?;
            log::debug!("created space table {} at {}", table, path.display());
        }
        let store = Self {
            table: table.to_string(),
            path,
            state: Mutex::new(FsState::default()),
        };
        // Validates the header and warms the cache.
        store.entries()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_loaded(&self, state: &mut FsState) -> StoreResult<()> {
        if state.rows.is_some() {
            return Ok(());
        }
        state.rows = Some(read_rows(&self.path, &self.table)?);
        Ok(())
    }
}

impl EntryStore for FsEntryStore {
    fn table(&self) -> &str {
        &self.table
    }

    fn create(&self, entry: SpaceEntry) -> StoreResult<EntryKey> {
        let mut state = self.state.lock();
        // Keys come from the file, not the row cache: another handle on the
        // same table may have appended since the cache was filled.
        let key = next_key(&read_rows(&self.path, &self.table)?);
        append_record(
            &self.path,
            &DiskRecord::Row {
                key,
                entry: entry.clone(),
            },
        )?;
        if let Some(rows) = state.rows.as_mut() {
            rows.push((key, entry));
        }
        Ok(key)
    }

    fn entries(&self) -> StoreResult<Vec<(EntryKey, SpaceEntry)>> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        Ok(state.rows.clone().unwrap_or_default())
    }

    fn invalidate_cache(&self) {
        self.state.lock().rows = None;
    }
}

fn next_key(rows: &[(EntryKey, SpaceEntry)]) -> EntryKey {
    EntryKey(rows.iter().map(|(key, _)| key.0 + 1).max().unwrap_or(0))
}

fn append_record(path: &Path, record: &DiskRecord) -> StoreResult<()> {
    let bytes = to_canonical_cbor(record)?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| StoreError::Corrupt("record larger than 4GiB".into()))?;
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| io_error(path, e))?;
    file.write_all(&len.to_le_bytes())
        .map_err(|e| io_error(path, e))?;
    file.write_all(&bytes).map_err(|e| io_error(path, e))?;
    file.sync_all().map_err(|e| io_error(path, e))
}

fn read_rows(path: &Path, table: &str) -> StoreResult<Vec<(EntryKey, SpaceEntry)>> {
    let mut file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut rows = Vec::new();
    let mut saw_header = false;
    loop {
        let mut len_buf = [0u8; 4];
        let read = file.read(&mut len_buf).map_err(|e| io_error(path, e))?;
        if read == 0 {
            break;
        }
        if read < len_buf.len() {
            return Err(StoreError::Corrupt(format!(
                "truncated length header in {table} (read {read} bytes)"
            )));
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        if let Err(err) = file.read_exact(&mut buf) {
            if err.kind() == ErrorKind::UnexpectedEof {
                return Err(StoreError::Corrupt(format!(
                    "truncated record payload in {table}"
                )));
            }
            return Err(io_error(path, err));
        }
        match from_cbor::<DiskRecord>(&buf)? {
            DiskRecord::Header { version } if !saw_header => {
                if version != ENTRY_SCHEMA_VERSION {
                    return Err(StoreError::Version {
                        table: table.to_string(),
                        expected: ENTRY_SCHEMA_VERSION,
                        found: version,
                    });
                }
                saw_header = true;
            }
            DiskRecord::Header { .. } => {
                return Err(StoreError::Corrupt(format!("duplicate header in {table}")));
            }
            DiskRecord::Row { .. } if !saw_header => {
                return Err(StoreError::Corrupt(format!("missing header in {table}")));
            }
            DiskRecord::Row { key, entry } => rows.push((key, entry)),
        }
    }
    Ok(rows)
}

/// Opens tables as files under `<root>/spaces/`, sharing one handle per table.
#[derive(Clone)]
pub struct FsStoreFactory {
    root: PathBuf,
    open: Arc<Mutex<HashMap<String, Arc<FsEntryStore>>>>,
}

impl fmt::Debug for FsStoreFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsStoreFactory")
            .field("root", &self.root)
            .finish()
    }
}

impl FsStoreFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl EntryStoreFactory for FsStoreFactory {
    fn get_or_create_store(&self, table: &str) -> StoreResult<SharedEntryStore> {
        let mut open = self.open.lock();
        if let Some(store) = open.get(table) {
            return Ok(store.clone());
        }
        let store = Arc::new(FsEntryStore::open(&self.root, table)?);
        open.insert(table.to_string(), store.clone());
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rows_survive_reopen() {
        let tmp = TempDir::new().expect("tmp");
        {
            let store = FsEntryStore::open(tmp.path(), "MemorySpaces").expect("open");
            store.create(SpaceEntry::unbound("ram")).expect("create");
            store.create(SpaceEntry::new("register", 4, 0)).expect("create");
        }

        let again = FsEntryStore::open(tmp.path(), "MemorySpaces").expect("reopen");
        let rows = again.entries().expect("entries");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (EntryKey(0), SpaceEntry::unbound("ram")));
        assert_eq!(rows[1].1.context(), Some(4));

        let next = again.create(SpaceEntry::unbound("io")).expect("create");
        assert_eq!(next, EntryKey(2));
    }

    #[test]
    fn invalidate_observes_second_writer() {
        let tmp = TempDir::new().expect("tmp");
        let reader = FsEntryStore::open(tmp.path(), "t").expect("open");
        let writer = FsEntryStore::open(tmp.path(), "t").expect("open");
        writer.create(SpaceEntry::unbound("ram")).expect("create");

        assert!(reader.entries().expect("entries").is_empty());
        reader.invalidate_cache();
        assert_eq!(reader.entries().expect("entries").len(), 1);
        // key allocation resumes after the other writer's rows
        assert_eq!(reader.create(SpaceEntry::unbound("io")).unwrap(), EntryKey(1));
    }

    #[test]
    fn handles_on_one_table_never_share_a_key() {
        let tmp = TempDir::new().expect("tmp");
        let a = FsEntryStore::open(tmp.path(), "MemorySpaces").expect("open");
        let b = FsEntryStore::open(tmp.path(), "MemorySpaces").expect("open");

        let ka = a.create(SpaceEntry::unbound("ram")).expect("create");
        let kb = b.create(SpaceEntry::new("register", 1, 0)).expect("create");
        assert_ne!(ka, kb);
        assert_eq!(kb, EntryKey(1));

        // the row cache still only moves on invalidate
        assert_eq!(a.entries().unwrap(), vec![(ka, SpaceEntry::unbound("ram"))]);
        a.invalidate_cache();
        let keys: Vec<EntryKey> = a.entries().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![ka, kb]);
    }

    #[test]
    fn version_mismatch_is_reported() {
        let tmp = TempDir::new().expect("tmp");
        let dir = tmp.path().join(TABLE_DIR);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("old.{TABLE_EXT}"));
        append_record(&path, &DiskRecord::Header { version: 9 }).unwrap();

        let err = FsEntryStore::open(tmp.path(), "old").unwrap_err();
        assert!(err.is_version(), "unexpected error: {err:?}");
    }

    #[test]
    fn detects_truncated_record() {
        let tmp = TempDir::new().expect("tmp");
        let path = {
            let store = FsEntryStore::open(tmp.path(), "t").expect("open");
            store.create(SpaceEntry::unbound("ram")).expect("create");
            store.path().to_path_buf()
        };
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 1).unwrap();

        let err = FsEntryStore::open(tmp.path(), "t").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn factory_reuses_open_handles() {
        let tmp = TempDir::new().expect("tmp");
        let factory = FsStoreFactory::new(tmp.path());
        let a = factory.get_or_create_store("MemorySpaces").unwrap();
        a.create(SpaceEntry::unbound("ram")).unwrap();
        let b = factory.get_or_create_store("MemorySpaces").unwrap();
        assert_eq!(b.entries().unwrap().len(), 1);
        assert_eq!(b.table(), "MemorySpaces");
    }
}
