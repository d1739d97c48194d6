//! JSON-backed entity stores shared between processes
//!
//! a store keeps the whole record collection of one directory in memory.
//! every mutation rewrites `<entity>.json` atomically and touches
//! `<entity>.lock`, which is how other processes notice that their copy is
//! stale. callers serialize mutations across processes by holding the
//! exclusive lock (see [`Store::with_lock`]); the store itself never takes
//! the lock implicitly after opening.

mod bigdata;
mod image;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fs;
use crate::lockfile::{LockFile, LockGuard};
use crate::types::{generate_id, name_key, ContainerKind, ImageKind, Kind, LayerKind, Record};

pub use bigdata::big_data_base_name;
pub use image::RepositoryImages;

pub type ImageStore = Store<ImageKind>;
pub type LayerStore = Store<LayerKind>;
pub type ContainerStore = Store<ContainerKind>;

/// bookkeeping for the records of one kind in one directory
pub struct Store<K: Kind> {
    dir: PathBuf,
    lockfile: LockFile,
    records: Vec<Record<K>>,
    /// id -> slot in `records`
    by_id: HashMap<String, usize>,
    /// name key, `key@id` alias or raw name -> id
    by_name: HashMap<String, String>,
}

impl<K: Kind> Store<K> {
    /// open (creating if needed) the store in `dir` and load it
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir, 0o700)?;
        let lockfile = LockFile::open(&dir.join(format!("{}.lock", K::ENTITY)))?;
        let mut store = Self::with_lockfile(dir, lockfile);

        let _guard = store.lockfile.lock()?;
        store.load()?;
        Ok(store)
    }

    /// open an existing store without the right to change it
    pub fn open_read_only(dir: &Path) -> Result<Self> {
        let lockfile = LockFile::open_read_only(&dir.join(format!("{}.lock", K::ENTITY)))?;
        let mut store = Self::with_lockfile(dir, lockfile);

        let _guard = store.lockfile.lock_shared()?;
        store.load()?;
        Ok(store)
    }

    fn with_lockfile(dir: &Path, lockfile: LockFile) -> Self {
        Self {
            dir: dir.to_path_buf(),
            lockfile,
            records: vec![],
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// path to `<entity>.json`
    pub fn records_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", K::ENTITY))
    }

    /// directory holding a record's big data items
    fn data_dir(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    pub fn is_read_only(&self) -> bool {
        self.lockfile.is_read_only()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.lockfile.is_read_only() {
            return Err(Error::ReadOnlyLock(self.lockfile.path().to_path_buf()));
        }
        Ok(())
    }

    /// acquire the exclusive lock; released when the guard is dropped
    pub fn lock(&self) -> Result<LockGuard> {
        self.lockfile.lock()
    }

    /// acquire a shared lock; released when the guard is dropped
    pub fn lock_shared(&self) -> Result<LockGuard> {
        self.lockfile.lock_shared()
    }

    /// try to acquire the exclusive lock without waiting
    pub fn try_lock(&self) -> Result<Option<LockGuard>> {
        self.lockfile.try_lock()
    }

    /// mark the store as changed by this process
    pub fn touch(&mut self) -> Result<()> {
        self.lockfile.touch()
    }

    /// whether another handle saved since this one last looked
    pub fn modified(&mut self) -> Result<bool> {
        self.lockfile.modified()
    }

    pub fn touched_since(&self, when: SystemTime) -> bool {
        self.lockfile.touched_since(when)
    }

    /// reload from disk if another handle saved in the meantime
    pub fn reload_if_modified(&mut self) -> Result<bool> {
        let persist_repairs = !self.lockfile.is_read_only();
        self.reload_if_modified_inner(persist_repairs)
    }

    fn reload_if_modified_inner(&mut self, persist_repairs: bool) -> Result<bool> {
        let seen = self.lockfile.last_writer().to_string();
        if !self.lockfile.modified()? {
            return Ok(false);
        }
        debug!(entity = K::ENTITY, dir = %self.dir.display(), "store changed on disk, reloading");
        if let Err(e) = self.load_records(persist_repairs) {
            // keep reporting the change until a load succeeds
            self.lockfile.restore_writer(seen);
            return Err(e);
        }
        Ok(true)
    }

    /// run `f` while holding the exclusive lock, on a fresh view of the store
    pub fn with_lock<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let _guard = self.lockfile.lock()?;
        self.reload_if_modified_inner(true)?;
        f(self)
    }

    /// run `f` while holding a shared lock, on a fresh view of the store
    pub fn with_read_lock<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let _guard = self.lockfile.lock_shared()?;
        // repairs must not be written under a shared lock
        self.reload_if_modified_inner(false)?;
        f(self)
    }

    /// read the record collection and rebuild the indexes
    ///
    /// a missing file is an empty store. names claimed by more than one
    /// record are given to the later record; the repair is saved right away
    /// unless the store is read-only.
    pub fn load(&mut self) -> Result<()> {
        let persist_repairs = !self.lockfile.is_read_only();
        self.load_records(persist_repairs)
    }

    fn load_records(&mut self, persist_repairs: bool) -> Result<()> {
        let path = self.records_path();
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(source) => return Err(Error::Io { path, source }),
        };

        let records: Vec<Record<K>> = if data.is_empty() {
            vec![]
        } else {
            serde_json::from_slice(&data).map_err(|e| Error::CorruptStore {
                path: path.clone(),
                reason: e.to_string(),
            })?
        };

        let mut ids = HashSet::new();
        for record in &records {
            if !ids.insert(record.id.as_str()) {
                return Err(Error::CorruptStore {
                    path,
                    reason: format!("duplicate id {}", record.id),
                });
            }
        }

        self.records = records;
        let repaired = self.reindex();
        for record in &mut self.records {
            refresh_or_warn(record);
        }
        debug!(entity = K::ENTITY, records = self.records.len(), "loaded store");

        if repaired {
            if persist_repairs {
                warn!(path = %path.display(), "names claimed by several records, saving repaired store");
                self.save()?;
            } else {
                warn!(path = %path.display(), "names claimed by several records, repaired in memory only");
            }
        }
        Ok(())
    }

    /// write the whole record collection and tell other handles about it
    pub fn save(&mut self) -> Result<()> {
        self.ensure_writable()?;

        let path = self.records_path();
        fs::create_dir_all(&self.dir, 0o700)?;
        let data = serde_json::to_vec(&self.records).map_err(Error::Encode)?;
        fs::write_atomic(&path, &data, 0o600)?;
        self.lockfile.touch()?;

        debug!(entity = K::ENTITY, records = self.records.len(), "saved store");
        Ok(())
    }

    /// add a record
    ///
    /// an empty `id` gets a random one. nothing changes unless the id and
    /// every name are free and usable.
    pub fn create(
        &mut self,
        id: &str,
        names: &[String],
        kind: K,
        metadata: &str,
    ) -> Result<&Record<K>> {
        self.ensure_writable()?;
        if !id.is_empty() {
            validate_id::<K>(id)?;
        }

        let id = if id.is_empty() {
            let mut id = generate_id();
            while self.by_id.contains_key(&id) {
                id = generate_id();
            }
            id
        } else {
            id.to_string()
        };
        if self.by_id.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }

        if let Some(name) = names.iter().find(|n| name_key(n).is_empty()) {
            return Err(Error::invalid_name(name.as_str(), "name must not be empty"));
        }
        let names = clean_names(names);
        for name in &names {
            if self.by_name.contains_key(name_key(name)) {
                return Err(Error::DuplicateName(name.clone()));
            }
        }
        K::validate_names(&names)?;

        let mut record = Record::new(id.clone(), names, kind, metadata);
        record.refresh()?;

        let slot = self.records.len();
        self.records.push(record);
        self.by_id.insert(id.clone(), slot);
        for name in self.records[slot].names.clone() {
            self.index_name(&name, &id);
        }
        self.save()?;

        debug!(entity = K::ENTITY, id = %id, "created record");
        Ok(&self.records[slot])
    }

    /// find a record by name or id
    pub fn get(&self, id_or_name: &str) -> Result<&Record<K>> {
        let slot = self.slot(id_or_name)?;
        Ok(&self.records[slot])
    }

    pub fn exists(&self, id_or_name: &str) -> bool {
        self.slot(id_or_name).is_ok()
    }

    /// translate a name (or id) to an id
    pub fn lookup(&self, id_or_name: &str) -> Result<String> {
        Ok(self.get(id_or_name)?.id.clone())
    }

    /// copies of every record
    pub fn list(&self) -> Vec<Record<K>> {
        self.records.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record<K>> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// replace the names of a record
    ///
    /// names another record holds are taken away from it. the part of a name
    /// after '@' is not used for lookups; `name@id` always resolves.
    pub fn set_names(&mut self, id_or_name: &str, names: &[String]) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.slot(id_or_name)?;
        let names = clean_names(names);
        K::validate_names(&names)?;

        let id = self.records[slot].id.clone();
        for old in self.records[slot].names.clone() {
            self.unindex_name(&old, &id);
        }

        let mut losers = vec![];
        for name in &names {
            let key = name_key(name);
            if let Some(owner) = self.by_name.get(key).cloned() {
                if owner != id {
                    if let Some(other) = self.strip_name(&owner, key) {
                        debug!(entity = K::ENTITY, name = %key, from = %owner, to = %id, "reassigned name");
                        losers.push(other);
                    }
                }
            }
            self.index_name(name, &id);
        }

        self.records[slot].names = names;
        self.records[slot].refresh()?;
        for other in losers {
            self.records[other].refresh()?;
        }
        self.save()
    }

    pub fn metadata(&self, id_or_name: &str) -> Result<String> {
        Ok(self.get(id_or_name)?.metadata.clone())
    }

    pub fn set_metadata(&mut self, id_or_name: &str, metadata: &str) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.slot(id_or_name)?;
        self.records[slot].metadata = metadata.to_string();
        self.save()
    }

    pub fn flag(&self, id_or_name: &str, flag: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.get(id_or_name)?.flag(flag).cloned())
    }

    pub fn set_flag(&mut self, id_or_name: &str, flag: &str, value: serde_json::Value) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.slot(id_or_name)?;
        self.records[slot].flags.insert(flag.to_string(), value);
        self.save()
    }

    pub fn clear_flag(&mut self, id_or_name: &str, flag: &str) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.slot(id_or_name)?;
        self.records[slot].flags.remove(flag);
        self.save()
    }

    /// remove a record and its big data
    ///
    /// the record is gone from disk before its data directory is removed; a
    /// failure to remove the directory is reported but not rolled back.
    pub fn delete(&mut self, id_or_name: &str) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.slot(id_or_name)?;
        self.delete_slot(slot)
    }

    fn delete_slot(&mut self, slot: usize) -> Result<()> {
        let record = self.records.remove(slot);
        for name in &record.names {
            self.unindex_name(name, &record.id);
        }
        self.by_id.remove(&record.id);
        for (i, r) in self.records.iter().enumerate().skip(slot) {
            self.by_id.insert(r.id.clone(), i);
        }

        self.save()?;
        fs::remove_dir_all(&self.data_dir(&record.id))?;

        debug!(entity = K::ENTITY, id = %record.id, "deleted record");
        Ok(())
    }

    /// remove every record
    pub fn wipe(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let ids: Vec<String> = self.records.iter().map(|r| r.id.clone()).collect();
        for id in ids {
            if let Some(slot) = self.by_id.get(&id).copied() {
                self.delete_slot(slot)?;
            }
        }
        Ok(())
    }

    fn slot(&self, id_or_name: &str) -> Result<usize> {
        let id = self
            .by_name
            .get(id_or_name)
            .map(String::as_str)
            .unwrap_or(id_or_name);
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| Error::NotFound(id_or_name.to_string()))
    }

    /// rebuild both indexes, returning whether conflicting names were dropped
    fn reindex(&mut self) -> bool {
        self.by_id.clear();
        self.by_name.clear();

        let mut repaired = false;
        for slot in 0..self.records.len() {
            let id = self.records[slot].id.clone();
            self.by_id.insert(id.clone(), slot);

            for name in self.records[slot].names.clone() {
                let key = name_key(&name);
                if let Some(owner) = self.by_name.get(key).cloned() {
                    if owner != id {
                        self.strip_name(&owner, key);
                        repaired = true;
                    }
                }
                self.index_name(&name, &id);
            }
        }
        repaired
    }

    fn index_name(&mut self, name: &str, id: &str) {
        for key in index_keys(name, id) {
            self.by_name.insert(key, id.to_string());
        }
    }

    fn unindex_name(&mut self, name: &str, id: &str) {
        for key in index_keys(name, id) {
            if self.by_name.get(&key).map(String::as_str) == Some(id) {
                self.by_name.remove(&key);
            }
        }
    }

    /// take every name with index key `key` away from record `owner`
    fn strip_name(&mut self, owner: &str, key: &str) -> Option<usize> {
        let slot = *self.by_id.get(owner)?;
        let (stripped, kept): (Vec<String>, Vec<String>) =
            std::mem::take(&mut self.records[slot].names)
                .into_iter()
                .partition(|n| name_key(n) == key);
        self.records[slot].names = kept;
        for name in &stripped {
            self.unindex_name(name, owner);
        }
        Some(slot)
    }
}

/// index entries for one name of record `id`; digests are never indexed
fn index_keys(name: &str, id: &str) -> Vec<String> {
    let key = name_key(name);
    if key.is_empty() {
        return vec![];
    }
    vec![key.to_string(), format!("{}@{}", key, id)]
}

/// record IDs become directory names under the store directory
fn validate_id<K: Kind>(id: &str) -> Result<()> {
    let reason = if id == "." || id == ".." {
        "ID must not be a relative directory"
    } else if id.contains('/') || id.contains('\0') {
        "ID must not contain '/' or NUL"
    } else if id == format!("{}.json", K::ENTITY) || id == format!("{}.lock", K::ENTITY) {
        "ID must not name a store file"
    } else {
        return Ok(());
    };
    Err(Error::invalid_name(id, reason))
}

/// drop names with an empty key and exact duplicates, keeping order
fn clean_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|n| !name_key(n).is_empty())
        .filter(|n| seen.insert(n.as_str()))
        .cloned()
        .collect()
}

fn refresh_or_warn<K: Kind>(record: &mut Record<K>) {
    if let Err(e) = record.refresh() {
        warn!(id = %record.id, error = %e, "cannot derive names for record");
    }
}
