use std::collections::BTreeMap;

/// State of one cached key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEntry {
    /// Read from the backing file, unchanged since.
    Clean(Vec<u8>),
    /// Written through this handle, persisted on close.
    Dirty(Vec<u8>),
    /// Deleted through this handle, reclaimed on close.
    Tombstone,
}

/// Per-handle write-back cache and change log.
///
/// Entries shadow the backing file until the handle closes: a dirty
/// entry wins over any on-disk record with the same key, a tombstone
/// suppresses reads even when the key was never persisted.
#[derive(Default)]
pub struct WriteCache {
    entries: BTreeMap<Vec<u8>, CacheEntry>,
}

impl WriteCache {
    pub fn get(&self, key: &[u8]) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert_dirty(&mut self, key: &[u8], value: &[u8]) {
        self.entries
            .insert(key.to_vec(), CacheEntry::Dirty(value.to_vec()));
    }

    pub fn insert_clean(&mut self, key: &[u8], value: Vec<u8>) {
        self.entries.insert(key.to_vec(), CacheEntry::Clean(value));
    }

    pub fn insert_tombstone(&mut self, key: &[u8]) {
        self.entries.insert(key.to_vec(), CacheEntry::Tombstone);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &CacheEntry)> {
        self.entries.iter()
    }

    /// True if any entry still needs to reach the backing file.
    pub fn has_pending(&self) -> bool {
        self.entries
            .values()
            .any(|entry| !matches!(entry, CacheEntry::Clean(_)))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
