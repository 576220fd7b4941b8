use percom_api_types::{PersError, MAX_KEY_LEN, MAX_VALUE_LEN};

// WARNING: PLEASE DO NOT MODIFY THOSE MAGIC VALUES

// openssl::sha::sha256(b"PerCom local database file v1.0")[0..8]
pub const PERCOM_LOCALDB_MAGIC_1_0: [u8; 8] = [250, 66, 221, 242, 15, 126, 185, 70];

// openssl::sha::sha256(b"PerCom database coordination header v1.0")[0..8]
pub const PERCOM_COORD_MAGIC_1_0: [u8; 8] = [158, 195, 112, 174, 121, 198, 236, 193];

/// On-disk format version written into the file header.
pub const FORMAT_VERSION_1: u32 = 1;

/// Number of buckets per hash table block.
pub const HASH_TABLE_CAPACITY: usize = 512;

/// Bucket count at which an insertion spills into the next table.
pub const TABLE_FILL_LIMIT: u32 = (HASH_TABLE_CAPACITY * 3 / 4) as u32;

/// Bucket value meaning "never used, probing may stop here".
pub const BUCKET_EMPTY: u64 = 0;
/// Bucket value meaning "cleared by a delete, probing continues past it".
pub const BUCKET_CLEARED: u64 = u64::MAX;

/// Size of the per-table trailer: `[next_table_offset: u64][fill: u32][pad: u32]`
pub const TABLE_TRAILER_SIZE: usize = 16;
pub const TABLE_NEXT_OFFSET: usize = HASH_TABLE_CAPACITY * 8;
pub const TABLE_FILL_OFFSET: usize = TABLE_NEXT_OFFSET + 8;
/// Size of one hash table block (buckets plus trailer).
pub const TABLE_SIZE: usize = HASH_TABLE_CAPACITY * 8 + TABLE_TRAILER_SIZE;

/// One value copy: `[len: u32][value: MAX_VALUE_LEN][crc: u32]`. The CRC
/// covers the little-endian length followed by the first `len` value bytes.
pub const VALUE_COPY_SIZE: usize = 4 + MAX_VALUE_LEN + 4;
pub const COPY_CRC_OFFSET: usize = 4 + MAX_VALUE_LEN;

/// Record slot layout. Each copy carries its own length so a torn write
/// into one copy region can never invalidate the other.
pub const SLOT_KEY_LEN_OFFSET: usize = 0;
pub const SLOT_KEY_OFFSET: usize = 2;
pub const SLOT_COPY_A_OFFSET: usize = SLOT_KEY_OFFSET + MAX_KEY_LEN;
pub const SLOT_COPY_B_OFFSET: usize = SLOT_COPY_A_OFFSET + VALUE_COPY_SIZE;
pub const SLOT_FLAGS_OFFSET: usize = SLOT_COPY_B_OFFSET + VALUE_COPY_SIZE;
/// Size of one record slot.
pub const SLOT_SIZE: usize = SLOT_FLAGS_OFFSET + 1;

/// Tombstone bit in the slot flags byte. Set while a slot sits on the
/// free list, cleared as the last step of a record write.
pub const SLOT_FLAG_TOMBSTONE: u8 = 0x1;

/// Header format definition for local database files
///
/// All integer fields are stored little-endian. The geometry fields pin
/// the build constants the file was created with; files with different
/// geometry are refused.
#[repr(C)]
pub struct DbHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub table_capacity: u32,
    pub max_key_len: u32,
    pub max_value_len: u32,
    pub first_table_offset: u64,
    pub free_list_head: u64,
    reserved: [u8; 4056], // overall size is one page (4096 bytes)
}
proxmox_lang::static_assert_size!(DbHeader, 4096);

/// Size of the file header.
pub const HEADER_SIZE: usize = std::mem::size_of::<DbHeader>();

/// Offset of the first hash table, directly after the header.
pub const FIRST_TABLE_OFFSET: u64 = HEADER_SIZE as u64;

/// In-file offset of the free list anchor, patched in place.
pub const HEADER_FREE_LIST_OFFSET: u64 = 32;

impl DbHeader {
    /// Allocate a header for a fresh database file.
    pub fn new() -> Box<Self> {
        let mut this: Box<Self> = unsafe {
            Box::from_raw(std::alloc::alloc_zeroed(std::alloc::Layout::new::<Self>()) as *mut Self)
        };
        this.magic = PERCOM_LOCALDB_MAGIC_1_0;
        this.version = FORMAT_VERSION_1.to_le();
        this.table_capacity = (HASH_TABLE_CAPACITY as u32).to_le();
        this.max_key_len = (MAX_KEY_LEN as u32).to_le();
        this.max_value_len = (MAX_VALUE_LEN as u32).to_le();
        this.first_table_offset = FIRST_TABLE_OFFSET.to_le();
        this.free_list_head = 0;
        this
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self as *const Self as *const u8,
                std::mem::size_of::<Self>(),
            )
        }
    }

    /// Validate magic, version and geometry of a header read from disk.
    pub fn check(&self) -> Result<(), PersError> {
        if self.magic != PERCOM_LOCALDB_MAGIC_1_0 {
            return Err(PersError::Corrupt("got unknown magic number".to_string()));
        }
        let version = u32::from_le(self.version);
        if version != FORMAT_VERSION_1 {
            return Err(PersError::Version(format!(
                "got unknown version {}",
                version
            )));
        }
        let capacity = u32::from_le(self.table_capacity);
        let key_len = u32::from_le(self.max_key_len);
        let value_len = u32::from_le(self.max_value_len);
        if capacity != HASH_TABLE_CAPACITY as u32
            || key_len != MAX_KEY_LEN as u32
            || value_len != MAX_VALUE_LEN as u32
        {
            return Err(PersError::Version(format!(
                "geometry mismatch (capacity {}, key {}, value {})",
                capacity, key_len, value_len
            )));
        }
        Ok(())
    }

    pub fn free_list_head(&self) -> u64 {
        u64::from_le(self.free_list_head)
    }
}
