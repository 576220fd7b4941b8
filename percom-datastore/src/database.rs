use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use percom_api_types::{PersError, MAX_KEY_LEN, MAX_VALUE_LEN};

use crate::cache::{CacheEntry, WriteCache};
use crate::hash_index::TableChain;
use crate::shared_header::CoordHeader;
use crate::slot_file::{SlotFile, SyncLevel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandleState {
    Open,
    /// Latched on unrecoverable I/O, corruption or out-of-space; every
    /// operation except close fails afterwards.
    Error,
    Closed,
}

/// One open database.
///
/// Ties together the slotted record file, the in-process view of the
/// hash table chain, the write-back cache and the attached cross-process
/// coordination header. All writes stay in the cache until [`close`]
/// flushes them under the shared mutex; other processes never observe a
/// partially flushed state.
///
/// [`close`]: Database::close
pub struct Database {
    path: PathBuf,
    slots: SlotFile,
    chain: TableChain,
    cache: WriteCache,
    coord: CoordHeader,
    state: HandleState,
}

impl Database {
    /// Open a database file, creating it when `create` is set.
    ///
    /// The path must be absolute; callers canonicalize it so that every
    /// spelling of one file attaches to one coordination header.
    pub fn open(path: &Path, create: bool, sync_level: SyncLevel) -> Result<Self, PersError> {
        if !path.is_absolute() {
            return Err(PersError::BadArg(format!(
                "expected absolute path - got {:?}",
                path
            )));
        }

        let exists = path.exists();
        if !exists && !create {
            return Err(PersError::NotFound);
        }

        let slots = if exists {
            SlotFile::open(path, sync_level)?
        } else {
            SlotFile::create(path, sync_level)?
        };

        let coord = CoordHeader::attach(path)?;

        // Under the lock the on-disk chain is authoritative; raise the
        // shared count to what the walk found (self-healing after a
        // crashed writer left a stale header behind).
        let chain = {
            let mut guard = coord.lock();
            let chain = TableChain::load(&slots)?;
            guard.table_count = chain.len() as u32;
            chain
        };

        Ok(Self {
            path: path.to_owned(),
            slots,
            chain,
            cache: WriteCache::default(),
            coord,
            state: HandleState::Open,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_open(&self) -> Result<(), PersError> {
        match self.state {
            HandleState::Open => Ok(()),
            HandleState::Error => Err(PersError::Io("handle in failed state".to_string())),
            HandleState::Closed => Err(PersError::NoHandle("handle already closed".to_string())),
        }
    }

    fn check_key(key: &[u8]) -> Result<(), PersError> {
        if key.is_empty() {
            return Err(PersError::BadArg("empty key".to_string()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(PersError::BadArg(format!(
                "key too long ({} > {})",
                key.len(),
                MAX_KEY_LEN
            )));
        }
        Ok(())
    }

    /// Latch the handle into the error state on unrecoverable failures.
    fn latch<T>(&mut self, result: Result<T, PersError>) -> Result<T, PersError> {
        if let Err(err) = &result {
            match err {
                PersError::Io(_) | PersError::Corrupt(_) | PersError::NoSpace(_) => {
                    log::error!("database {:?} failed - {}", self.path, err);
                    self.state = HandleState::Error;
                }
                _ => {}
            }
        }
        result
    }

    /// Insert or replace a key in the cache. The file is untouched until
    /// close.
    pub fn write_key(&mut self, key: &[u8], value: &[u8]) -> Result<usize, PersError> {
        self.check_open()?;
        Self::check_key(key)?;
        if value.is_empty() || value.len() > MAX_VALUE_LEN {
            return Err(PersError::BadArg(format!(
                "value size {} out of range [1, {}]",
                value.len(),
                MAX_VALUE_LEN
            )));
        }
        self.cache.insert_dirty(key, value);
        Ok(value.len())
    }

    /// Read a key into `buf`, returning the number of bytes copied
    /// (at most `buf.len()`).
    pub fn read_key(&mut self, key: &[u8], buf: &mut [u8]) -> Result<usize, PersError> {
        self.check_open()?;
        Self::check_key(key)?;
        if buf.is_empty() {
            return Err(PersError::BadArg("empty read buffer".to_string()));
        }
        let value = self.lookup_value(key)?;
        let count = value.len().min(buf.len());
        buf[..count].copy_from_slice(&value[..count]);
        Ok(count)
    }

    /// Size of the value stored under a key.
    pub fn get_key_size(&mut self, key: &[u8]) -> Result<usize, PersError> {
        self.check_open()?;
        Self::check_key(key)?;
        Ok(self.lookup_value(key)?.len())
    }

    /// Mark a key deleted. Inserts a tombstone regardless of whether the
    /// key exists anywhere, so deletes are idempotent.
    pub fn delete_key(&mut self, key: &[u8]) -> Result<(), PersError> {
        self.check_open()?;
        Self::check_key(key)?;
        self.cache.insert_tombstone(key);
        Ok(())
    }

    fn lookup_value(&mut self, key: &[u8]) -> Result<Vec<u8>, PersError> {
        match self.cache.get(key) {
            Some(CacheEntry::Dirty(value)) | Some(CacheEntry::Clean(value)) => {
                return Ok(value.clone())
            }
            Some(CacheEntry::Tombstone) => return Err(PersError::NotFound),
            None => {}
        }

        let result = self.disk_lookup(key);
        match self.latch(result)? {
            Some(value) => {
                self.cache.insert_clean(key, value.clone());
                Ok(value)
            }
            None => Err(PersError::NotFound),
        }
    }

    fn disk_lookup(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, PersError> {
        let guard = self.coord.lock();
        if guard.table_count as usize > self.chain.len() {
            self.chain.refresh(&self.slots)?;
        }
        match self.chain.lookup(&self.slots, key)? {
            Some(bucket) => Ok(Some(self.slots.read_record(bucket.slot_off)?)),
            None => Ok(None),
        }
    }

    /// Total size of the keys list: every live key plus its NUL
    /// terminator.
    pub fn get_keys_list_size(&mut self) -> Result<usize, PersError> {
        self.check_open()?;
        let keys = self.live_keys()?;
        Ok(keys.iter().map(|key| key.len() + 1).sum())
    }

    /// Write all live keys into `buf` as NUL-terminated names. Every key
    /// appears exactly once; the order is unspecified.
    pub fn get_keys_list(&mut self, buf: &mut [u8]) -> Result<usize, PersError> {
        self.check_open()?;
        if buf.is_empty() {
            return Err(PersError::BadArg("empty keys list buffer".to_string()));
        }
        let keys = self.live_keys()?;
        let total: usize = keys.iter().map(|key| key.len() + 1).sum();
        if buf.len() < total {
            return Err(PersError::BadArg(format!(
                "keys list buffer too small ({} < {})",
                buf.len(),
                total
            )));
        }
        let mut pos = 0;
        for key in keys {
            buf[pos..pos + key.len()].copy_from_slice(&key);
            buf[pos + key.len()] = 0;
            pos += key.len() + 1;
        }
        Ok(total)
    }

    /// Union of on-disk keys and cached writes, minus tombstones.
    fn live_keys(&mut self) -> Result<BTreeSet<Vec<u8>>, PersError> {
        let result = self.disk_keys();
        let mut keys = self.latch(result)?;
        for (key, entry) in self.cache.iter() {
            match entry {
                CacheEntry::Dirty(_) => {
                    keys.insert(key.clone());
                }
                CacheEntry::Tombstone => {
                    keys.remove(key);
                }
                CacheEntry::Clean(_) => {}
            }
        }
        Ok(keys)
    }

    fn disk_keys(&mut self) -> Result<BTreeSet<Vec<u8>>, PersError> {
        let guard = self.coord.lock();
        if guard.table_count as usize > self.chain.len() {
            self.chain.refresh(&self.slots)?;
        }
        let mut keys = BTreeSet::new();
        for slot_off in self.chain.live_slots(&self.slots)? {
            keys.insert(self.slots.read_key_at(slot_off)?);
        }
        Ok(keys)
    }

    /// Flush the cache and release the handle.
    ///
    /// This is the only point where cached writes reach the file. A
    /// handle in the error state releases its resources without another
    /// flush attempt. On flush failure the handle latches into the error
    /// state and stays open; a second close releases it.
    pub fn close(&mut self) -> Result<(), PersError> {
        match self.state {
            HandleState::Closed => Err(PersError::NoHandle("handle already closed".to_string())),
            HandleState::Error => {
                self.cache.clear();
                self.state = HandleState::Closed;
                Ok(())
            }
            HandleState::Open => {
                let result = self.flush();
                let result = self.latch(result);
                if result.is_ok() {
                    self.cache.clear();
                    self.state = HandleState::Closed;
                }
                result
            }
        }
    }

    fn flush(&mut self) -> Result<(), PersError> {
        if !self.cache.has_pending() {
            return Ok(());
        }

        let mut guard = self.coord.lock();
        if guard.table_count as usize > self.chain.len() {
            self.chain.refresh(&self.slots)?;
        }

        // reclaim deleted records first, so their slots are available for
        // the writes below
        for (key, entry) in self.cache.iter() {
            if !matches!(entry, CacheEntry::Tombstone) {
                continue;
            }
            if let Some(bucket) = self.chain.lookup(&self.slots, key)? {
                self.slots.free_slot(bucket.slot_off)?;
                self.chain.clear_bucket(&mut self.slots, bucket.bucket_off)?;
            }
        }

        for (key, entry) in self.cache.iter() {
            let value = match entry {
                CacheEntry::Dirty(value) => value,
                _ => continue,
            };
            match self.chain.lookup(&self.slots, key)? {
                Some(bucket) => {
                    self.slots.write_record(bucket.slot_off, key, value)?;
                }
                None => {
                    let slot_off = self.slots.allocate_slot()?;
                    self.slots.write_record(slot_off, key, value)?;
                    if self.chain.insert(&mut self.slots, key, slot_off)? {
                        guard.table_count = self.chain.len() as u32;
                    }
                }
            }
        }

        self.slots.sync()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.state == HandleState::Open && self.cache.has_pending() {
            log::error!(
                "database {:?} dropped with unflushed changes - call close",
                self.path
            );
        }
    }
}
