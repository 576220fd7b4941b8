//! Basic types shared by the percom persistence crates.

use bitflags::bitflags;

mod error;
pub use error::{
    PersError, ERR_BAD_ARG, ERR_CORRUPT, ERR_EXISTS, ERR_IO, ERR_LOCK, ERR_NOT_FOUND,
    ERR_NO_HANDLE, ERR_NO_SPACE, ERR_VERSION,
};

mod resource;
pub use resource::{
    ResourceConfig, MAX_CUSTOM_ID_LEN, MAX_CUSTOM_NAME_LEN, MAX_RESPONSIBLE_LEN,
    RESOURCE_CONFIG_SIZE,
};

/// Maximum length of a key name in bytes.
pub const MAX_KEY_LEN: usize = 128;

/// Maximum size of a value payload in bytes.
pub const MAX_VALUE_LEN: usize = 16384;

/// Maximum length of a database path passed to `open`.
pub const MAX_PATH_LEN: usize = 255;

/// Maximum number of concurrently open database handles per process.
pub const MAX_OPEN_DATABASES: usize = 64;

bitflags! {
    /// Mode bits accepted by `open`.
    pub struct OpenFlags: u32 {
        /// Create the database file if it does not exist.
        const CREATE = 0x1;
        /// Write-back caching. This is the default behaviour either way;
        /// the bit is accepted for compatibility with existing callers.
        const CACHED = 0x2;
    }
}
