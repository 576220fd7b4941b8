use std::hash::Hasher;

use twox_hash::XxHash64;

use percom_api_types::PersError;

use crate::file_format::*;
use crate::slot_file::SlotFile;

/// Bucket hash of a key.
///
/// The algorithm and seed are part of the on-disk format: the same key
/// must land in the same probe sequence in every process and every
/// release. Changing this is a format break.
pub fn key_hash(key: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(key);
    hasher.finish()
}

/// Location of a key in the hash chain.
pub struct BucketRef {
    /// In-file offset of the bucket pointing at the slot.
    pub bucket_off: u64,
    /// In-file offset of the record slot.
    pub slot_off: u64,
}

/// In-process view of the on-disk hash table chain.
///
/// The vector of table offsets is rebuilt lazily from the in-file links:
/// whenever the shared coordination header reports more tables than this
/// view holds, [`TableChain::refresh`] walks the extension. Tables are
/// never removed, so the walk only ever appends.
pub struct TableChain {
    tables: Vec<u64>,
}

impl TableChain {
    /// Walk the full chain from the first table.
    pub fn load(slots: &SlotFile) -> Result<Self, PersError> {
        let mut chain = Self {
            tables: vec![FIRST_TABLE_OFFSET],
        };
        chain.refresh(slots)?;
        Ok(chain)
    }

    /// Extend the view by following the link of the last known table.
    pub fn refresh(&mut self, slots: &SlotFile) -> Result<(), PersError> {
        loop {
            let last = *self.tables.last().unwrap();
            let next = slots.read_u64_at(last + TABLE_NEXT_OFFSET as u64)?;
            if next == 0 {
                return Ok(());
            }
            if next <= last {
                return Err(PersError::Corrupt(format!(
                    "hash table chain loops (link {} after {})",
                    next, last
                )));
            }
            self.tables.push(next);
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Find the slot holding `key`, if any.
    ///
    /// Probing within one table stops at the first never-used bucket;
    /// buckets cleared by a delete are probed past. A key that spilled
    /// into a later table stays reachable this way even after earlier
    /// tables regain room.
    pub fn lookup(&self, slots: &SlotFile, key: &[u8]) -> Result<Option<BucketRef>, PersError> {
        let hash = key_hash(key) as usize;
        for &table in &self.tables {
            for probe in 0..HASH_TABLE_CAPACITY {
                let idx = (hash + probe) % HASH_TABLE_CAPACITY;
                let bucket_off = table + (idx * 8) as u64;
                match slots.read_u64_at(bucket_off)? {
                    BUCKET_EMPTY => break,
                    BUCKET_CLEARED => continue,
                    slot_off => {
                        if slots.read_key_at(slot_off)? == key {
                            return Ok(Some(BucketRef {
                                bucket_off,
                                slot_off,
                            }));
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// Insert a bucket entry for a key known to be absent.
    ///
    /// Tables at their fill limit only accept inserts into cleared
    /// buckets; otherwise the entry spills into the next table, appending
    /// a fresh one at end-of-file if the chain is exhausted. Returns
    /// `true` when the chain grew.
    pub fn insert(
        &mut self,
        slots: &mut SlotFile,
        key: &[u8],
        slot_off: u64,
    ) -> Result<bool, PersError> {
        let hash = key_hash(key) as usize;

        for &table in &self.tables {
            if Self::try_insert(slots, table, hash, slot_off)? {
                return Ok(false);
            }
        }

        let new_table = slots.append_table()?;
        let last = *self.tables.last().unwrap();
        slots.write_u64_at(last + TABLE_NEXT_OFFSET as u64, new_table)?;
        self.tables.push(new_table);

        if !Self::try_insert(slots, new_table, hash, slot_off)? {
            return Err(PersError::Corrupt(format!(
                "freshly appended hash table at {} rejected insert",
                new_table
            )));
        }
        Ok(true)
    }

    fn try_insert(
        slots: &mut SlotFile,
        table: u64,
        hash: usize,
        slot_off: u64,
    ) -> Result<bool, PersError> {
        let fill = slots.read_u32_at(table + TABLE_FILL_OFFSET as u64)?;
        for probe in 0..HASH_TABLE_CAPACITY {
            let idx = (hash + probe) % HASH_TABLE_CAPACITY;
            let bucket_off = table + (idx * 8) as u64;
            match slots.read_u64_at(bucket_off)? {
                BUCKET_EMPTY => {
                    if fill >= TABLE_FILL_LIMIT {
                        return Ok(false);
                    }
                    slots.write_u64_at(bucket_off, slot_off)?;
                    slots.write_u32_at(table + TABLE_FILL_OFFSET as u64, fill + 1)?;
                    return Ok(true);
                }
                BUCKET_CLEARED => {
                    // reuse keeps the fill count, cleared buckets were
                    // already counted when first occupied
                    slots.write_u64_at(bucket_off, slot_off)?;
                    return Ok(true);
                }
                _ => continue,
            }
        }
        Ok(false)
    }

    /// Drop the bucket entry of a deleted key.
    pub fn clear_bucket(&self, slots: &mut SlotFile, bucket_off: u64) -> Result<(), PersError> {
        slots.write_u64_at(bucket_off, BUCKET_CLEARED)
    }

    /// Offsets of all record slots reachable through the chain.
    pub fn live_slots(&self, slots: &SlotFile) -> Result<Vec<u64>, PersError> {
        let mut offsets = Vec::new();
        for &table in &self.tables {
            for idx in 0..HASH_TABLE_CAPACITY {
                match slots.read_u64_at(table + (idx * 8) as u64)? {
                    BUCKET_EMPTY | BUCKET_CLEARED => {}
                    slot_off => offsets.push(slot_off),
                }
            }
        }
        Ok(offsets)
    }
}
