use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use proxmox_io::ReadExt;

use percom_api_types::{PersError, MAX_KEY_LEN, MAX_VALUE_LEN};

use crate::file_format::*;

/// Durability barrier policy for record writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SyncLevel {
    /// No barriers. Only suitable for throwaway files in test setups.
    None,
    /// A barrier after each value copy and at the end of a flush, so a
    /// crash can tear at most one copy region of one record.
    #[default]
    File,
}

/// The slotted record file.
///
/// Owns the file descriptor, the header-anchored free list and the
/// per-record dual-copy write and read protocol. Hash table blocks live
/// in the same file but are managed by [`TableChain`](crate::TableChain)
/// through the positional helpers below.
pub struct SlotFile {
    file: File,
    sync_level: SyncLevel,
    free_list_head: u64,
}

fn copy_checksum(len_bytes: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(len_bytes);
    hasher.update(value);
    hasher.finalize()
}

fn encode_copy(value: &[u8]) -> Vec<u8> {
    let mut copy = vec![0u8; VALUE_COPY_SIZE];
    copy[0..4].copy_from_slice(&(value.len() as u32).to_le_bytes());
    copy[4..4 + value.len()].copy_from_slice(value);
    let crc = copy_checksum(&copy[0..4], value);
    copy[COPY_CRC_OFFSET..COPY_CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
    copy
}

fn decode_copy(copy: &[u8]) -> Option<Vec<u8>> {
    let len = u32::from_le_bytes(copy[0..4].try_into().unwrap()) as usize;
    if len == 0 || len > MAX_VALUE_LEN {
        return None;
    }
    let stored = u32::from_le_bytes(copy[COPY_CRC_OFFSET..COPY_CRC_OFFSET + 4].try_into().unwrap());
    if copy_checksum(&copy[0..4], &copy[4..4 + len]) != stored {
        return None;
    }
    Some(copy[4..4 + len].to_vec())
}

impl SlotFile {
    /// Create a fresh database file with an empty first hash table.
    ///
    /// Falls back to [`SlotFile::open`] when another process wins the
    /// creation race.
    pub fn create(path: &Path, sync_level: SyncLevel) -> Result<Self, PersError> {
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Self::open(path, sync_level);
            }
            Err(err) => return Err(err.into()),
        };

        let header = DbHeader::new();
        file.write_all_at(header.as_bytes(), 0)?;
        file.write_all_at(&vec![0u8; TABLE_SIZE], FIRST_TABLE_OFFSET)?;
        file.sync_all()?;

        log::info!("created local database {:?}", path);

        Ok(Self {
            file,
            sync_level,
            free_list_head: 0,
        })
    }

    /// Open an existing database file, validating its header.
    pub fn open(path: &Path, sync_level: SyncLevel) -> Result<Self, PersError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let size = file.metadata()?.len();
        if (size as usize) < HEADER_SIZE + TABLE_SIZE {
            return Err(PersError::Corrupt(format!(
                "database file too small ({})",
                size
            )));
        }

        let mut buf = vec![0u8; HEADER_SIZE];
        file.read_exact_at(&mut buf, 0)?;
        let mut reader = &buf[..];
        let header: Box<DbHeader> = unsafe { reader.read_host_value_boxed()? };
        header.check()?;

        Ok(Self {
            file,
            sync_level,
            free_list_head: header.free_list_head(),
        })
    }

    fn barrier(&self) -> Result<(), PersError> {
        if self.sync_level == SyncLevel::File {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Final durability barrier of a flush.
    pub fn sync(&self) -> Result<(), PersError> {
        if self.sync_level == SyncLevel::File {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Write one record with the dual-copy protocol: copy A, barrier,
    /// copy B, barrier, then clear the tombstone flag. Works for both
    /// fresh slots and in-place updates.
    pub fn write_record(&mut self, slot_off: u64, key: &[u8], value: &[u8]) -> Result<(), PersError> {
        let mut head = [0u8; 2 + MAX_KEY_LEN];
        head[0..2].copy_from_slice(&(key.len() as u16).to_le_bytes());
        head[2..2 + key.len()].copy_from_slice(key);
        self.file.write_all_at(&head, slot_off)?;

        let copy = encode_copy(value);
        self.file
            .write_all_at(&copy, slot_off + SLOT_COPY_A_OFFSET as u64)?;
        self.barrier()?;
        self.file
            .write_all_at(&copy, slot_off + SLOT_COPY_B_OFFSET as u64)?;
        self.barrier()?;
        self.file
            .write_all_at(&[0u8], slot_off + SLOT_FLAGS_OFFSET as u64)?;

        Ok(())
    }

    /// Read one record, verifying copy A and falling back to copy B. A
    /// damaged copy is rewritten from the intact one (best effort).
    pub fn read_record(&self, slot_off: u64) -> Result<Vec<u8>, PersError> {
        let mut copy_a = vec![0u8; VALUE_COPY_SIZE];
        let err_a = match self
            .file
            .read_exact_at(&mut copy_a, slot_off + SLOT_COPY_A_OFFSET as u64)
        {
            Ok(()) => match decode_copy(&copy_a) {
                Some(value) => return Ok(value),
                None => None,
            },
            Err(err) => Some(err),
        };

        let mut copy_b = vec![0u8; VALUE_COPY_SIZE];
        match self
            .file
            .read_exact_at(&mut copy_b, slot_off + SLOT_COPY_B_OFFSET as u64)
        {
            Ok(()) => match decode_copy(&copy_b) {
                Some(value) => {
                    match self.repair_copy(slot_off + SLOT_COPY_A_OFFSET as u64, &copy_b) {
                        Ok(()) => log::warn!(
                            "repaired damaged record copy in slot at offset {}",
                            slot_off
                        ),
                        Err(err) => log::warn!(
                            "unable to repair damaged record copy in slot at offset {} - {}",
                            slot_off,
                            err
                        ),
                    }
                    Ok(value)
                }
                None => match err_a {
                    Some(err) => Err(err.into()),
                    None => Err(PersError::Corrupt(format!(
                        "record at offset {} failed checksum on both copies",
                        slot_off
                    ))),
                },
            },
            Err(err) => Err(err.into()),
        }
    }

    fn repair_copy(&self, copy_off: u64, good: &[u8]) -> Result<(), PersError> {
        self.file.write_all_at(good, copy_off)?;
        self.barrier()
    }

    /// The key stored in a slot.
    pub fn read_key_at(&self, slot_off: u64) -> Result<Vec<u8>, PersError> {
        let mut head = [0u8; 2 + MAX_KEY_LEN];
        self.file.read_exact_at(&mut head, slot_off)?;
        let len = u16::from_le_bytes(head[0..2].try_into().unwrap()) as usize;
        if len == 0 || len > MAX_KEY_LEN {
            return Err(PersError::Corrupt(format!(
                "bad key length {} in slot at offset {}",
                len, slot_off
            )));
        }
        Ok(head[2..2 + len].to_vec())
    }

    /// Take a slot from the free list, or hand out end-of-file.
    pub fn allocate_slot(&mut self) -> Result<u64, PersError> {
        if self.free_list_head != 0 {
            let slot_off = self.free_list_head;
            let next = self.read_u64_at(slot_off + SLOT_KEY_OFFSET as u64)?;
            self.set_free_list_head(next)?;
            return Ok(slot_off);
        }
        Ok(self.file.metadata()?.len())
    }

    /// Tombstone a slot and push it onto the free list. The key area is
    /// reused as the free list link.
    pub fn free_slot(&mut self, slot_off: u64) -> Result<(), PersError> {
        self.file
            .write_all_at(&[SLOT_FLAG_TOMBSTONE], slot_off + SLOT_FLAGS_OFFSET as u64)?;
        let head = self.free_list_head;
        self.write_u64_at(slot_off + SLOT_KEY_OFFSET as u64, head)?;
        self.set_free_list_head(slot_off)
    }

    fn set_free_list_head(&mut self, head: u64) -> Result<(), PersError> {
        self.write_u64_at(HEADER_FREE_LIST_OFFSET, head)?;
        self.free_list_head = head;
        Ok(())
    }

    pub fn free_list_head(&self) -> u64 {
        self.free_list_head
    }

    /// Append a zeroed hash table block at end-of-file. Linking it into
    /// the chain is the caller's business.
    pub fn append_table(&mut self) -> Result<u64, PersError> {
        let table_off = self.file.metadata()?.len();
        self.file.write_all_at(&vec![0u8; TABLE_SIZE], table_off)?;
        Ok(table_off)
    }

    pub fn file_len(&self) -> Result<u64, PersError> {
        Ok(self.file.metadata()?.len())
    }

    pub(crate) fn read_u64_at(&self, off: u64) -> Result<u64, PersError> {
        let mut buf = [0u8; 8];
        self.file.read_exact_at(&mut buf, off)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn write_u64_at(&mut self, off: u64, value: u64) -> Result<(), PersError> {
        self.file.write_all_at(&value.to_le_bytes(), off)?;
        Ok(())
    }

    pub(crate) fn read_u32_at(&self, off: u64) -> Result<u32, PersError> {
        let mut buf = [0u8; 4];
        self.file.read_exact_at(&mut buf, off)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn write_u32_at(&mut self, off: u64, value: u32) -> Result<(), PersError> {
        self.file.write_all_at(&value.to_le_bytes(), off)?;
        Ok(())
    }
}
