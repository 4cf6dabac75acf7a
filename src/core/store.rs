// Record collection storage: the clientId unique constraint lives here.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::error::{Error, ErrorKind};
use crate::core::record::{ClientId, Record, RecordDraft, RecordId, RecordPatch};

const FORMAT_VERSION: u32 = 1;

/// Persistent collection of records keyed by store-assigned id, with a
/// uniqueness constraint on `clientId`.
///
/// `insert` and `update` check the constraint atomically with the write and
/// fail with `ErrorKind::Conflict` when it would be violated. Callers may
/// pre-check with `find_by_client_id`, but only the write decides.
pub trait RecordStore: Send + Sync {
    /// All records, most recently created first.
    fn list(&self) -> Result<Vec<Record>, Error>;

    fn get(&self, id: &RecordId) -> Result<Option<Record>, Error>;

    fn find_by_client_id(&self, client_id: ClientId) -> Result<Option<Record>, Error>;

    fn insert(&self, draft: RecordDraft) -> Result<Record, Error>;

    /// Returns `Ok(None)` when `id` does not exist.
    fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<Option<Record>, Error>;

    /// Returns the removed record, or `Ok(None)` when `id` does not exist.
    fn delete(&self, id: &RecordId) -> Result<Option<Record>, Error>;

    fn describe(&self) -> String;
}

pub fn conflict_error(client_id: ClientId) -> Error {
    Error::new(ErrorKind::Conflict)
        .with_message("unique constraint violated")
        .with_detail(format!("clientId {client_id} already exists"))
}

/// In-order record list plus the constraint logic shared by every store.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Collection {
    version: u32,
    records: Vec<Record>,
}

impl Collection {
    fn empty() -> Self {
        Self {
            version: FORMAT_VERSION,
            records: Vec::new(),
        }
    }

    fn newest_first(&self) -> Vec<Record> {
        let mut out: Vec<Record> = self.records.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|record| &record.id == id)
    }

    fn holder_of(&self, client_id: ClientId) -> Option<&Record> {
        self.records
            .iter()
            .find(|record| record.client_id == client_id)
    }

    fn insert(&mut self, draft: RecordDraft) -> Result<Record, Error> {
        if self.holder_of(draft.client_id).is_some() {
            return Err(conflict_error(draft.client_id));
        }
        let mut id = RecordId::generate()?;
        while self.get(&id).is_some() {
            id = RecordId::generate()?;
        }
        let now = OffsetDateTime::now_utc();
        let record = Record {
            id,
            client_id: draft.client_id,
            name: draft.name,
            address: draft.address,
            bio: draft.bio,
            created_at: now,
            updated_at: now,
        };
        self.records.push(record.clone());
        Ok(record)
    }

    fn update(&mut self, id: &RecordId, patch: &RecordPatch) -> Result<Option<Record>, Error> {
        if let Some(client_id) = patch.client_id {
            let taken = self
                .records
                .iter()
                .any(|record| record.client_id == client_id && &record.id != id);
            if taken && self.get(id).is_some() {
                return Err(conflict_error(client_id));
            }
        }
        let Some(record) = self.records.iter_mut().find(|record| &record.id == id) else {
            return Ok(None);
        };
        record.apply(patch);
        record.updated_at = OffsetDateTime::now_utc();
        Ok(Some(record.clone()))
    }

    fn delete(&mut self, id: &RecordId) -> Option<Record> {
        let index = self.records.iter().position(|record| &record.id == id)?;
        Some(self.records.remove(index))
    }
}

/// Volatile store for tests and throwaway servers.
#[derive(Clone)]
pub struct MemoryStore {
    collection: Arc<RwLock<Collection>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collection: Arc::new(RwLock::new(Collection::empty())),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Collection) -> T) -> Result<T, Error> {
        let guard = self
            .collection
            .read()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("store lock poisoned"))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Collection) -> Result<T, Error>) -> Result<T, Error> {
        let mut guard = self
            .collection
            .write()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("store lock poisoned"))?;
        f(&mut guard)
    }
}

impl RecordStore for MemoryStore {
    fn list(&self) -> Result<Vec<Record>, Error> {
        self.read(Collection::newest_first)
    }

    fn get(&self, id: &RecordId) -> Result<Option<Record>, Error> {
        self.read(|collection| collection.get(id).cloned())
    }

    fn find_by_client_id(&self, client_id: ClientId) -> Result<Option<Record>, Error> {
        self.read(|collection| collection.holder_of(client_id).cloned())
    }

    fn insert(&self, draft: RecordDraft) -> Result<Record, Error> {
        self.write(|collection| collection.insert(draft))
    }

    fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<Option<Record>, Error> {
        self.write(|collection| collection.update(id, patch))
    }

    fn delete(&self, id: &RecordId) -> Result<Option<Record>, Error> {
        self.write(|collection| Ok(collection.delete(id)))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// JSON document file guarded by a sidecar lock file.
///
/// Readers take a shared lock; writers take an exclusive lock for the whole
/// read-check-write cycle and replace the document with a rename, so the
/// constraint holds across threads and processes sharing the file.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| unavailable(&path, err))?;
        }
        let store = Self {
            lock_path: sidecar(&path, "lock"),
            path,
        };
        let _lock = store.lock(true)?;
        if store.path.exists() {
            store.load()?;
        } else {
            store.save(&Collection::empty())?;
        }
        Ok(store)
    }

    fn lock(&self, exclusive: bool) -> Result<StoreLock, Error> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|err| unavailable(&self.lock_path, err))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|err| unavailable(&self.lock_path, err))?;
        Ok(StoreLock { file })
    }

    fn load(&self) -> Result<Collection, Error> {
        let bytes = fs::read(&self.path).map_err(|err| unavailable(&self.path, err))?;
        let collection: Collection = serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("store document is not valid")
                .with_detail(self.path.display().to_string())
                .with_source(err)
        })?;
        if collection.version != FORMAT_VERSION {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("unsupported store version")
                .with_detail(format!("version {}", collection.version)));
        }
        Ok(collection)
    }

    fn save(&self, collection: &Collection) -> Result<(), Error> {
        let tmp_path = sidecar(&self.path, "tmp");
        let bytes = serde_json::to_vec_pretty(collection).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode store document")
                .with_source(err)
        })?;
        let mut file = File::create(&tmp_path).map_err(|err| unavailable(&tmp_path, err))?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| unavailable(&tmp_path, err))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| unavailable(&self.path, err))?;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Collection) -> T) -> Result<T, Error> {
        let _lock = self.lock(false)?;
        let collection = self.load()?;
        Ok(f(&collection))
    }

    /// Runs `f` under the exclusive lock and persists the collection when
    /// `f` reports a change.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut Collection) -> Result<(T, bool), Error>,
    ) -> Result<T, Error> {
        let _lock = self.lock(true)?;
        let mut collection = self.load()?;
        let (value, changed) = f(&mut collection)?;
        if changed {
            self.save(&collection)?;
        }
        Ok(value)
    }
}

impl RecordStore for FileStore {
    fn list(&self) -> Result<Vec<Record>, Error> {
        self.read(Collection::newest_first)
    }

    fn get(&self, id: &RecordId) -> Result<Option<Record>, Error> {
        self.read(|collection| collection.get(id).cloned())
    }

    fn find_by_client_id(&self, client_id: ClientId) -> Result<Option<Record>, Error> {
        self.read(|collection| collection.holder_of(client_id).cloned())
    }

    fn insert(&self, draft: RecordDraft) -> Result<Record, Error> {
        self.write(|collection| collection.insert(draft).map(|record| (record, true)))
    }

    fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<Option<Record>, Error> {
        self.write(|collection| {
            let updated = collection.update(id, patch)?;
            let changed = updated.is_some();
            Ok((updated, changed))
        })
    }

    fn delete(&self, id: &RecordId) -> Result<Option<Record>, Error> {
        self.write(|collection| {
            let removed = collection.delete(id);
            let changed = removed.is_some();
            Ok((removed, changed))
        })
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn unavailable(path: &Path, err: io::Error) -> Error {
    Error::new(ErrorKind::Unavailable)
        .with_message("store is unavailable")
        .with_detail(path.display().to_string())
        .with_source(err)
}
