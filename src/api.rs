//! Public operations of the local database store.
//!
//! Arguments are validated before any state change; a rejected call
//! leaves both the cache and the file untouched.

use std::path::{Path, PathBuf};

use percom_api_types::{OpenFlags, PersError, MAX_PATH_LEN};
use percom_datastore::{Database, SyncLevel};

use crate::registry;

fn check_path(path: &Path) -> Result<(), PersError> {
    let len = path.as_os_str().len();
    if len == 0 {
        return Err(PersError::BadArg("empty path".to_string()));
    }
    if len > MAX_PATH_LEN {
        return Err(PersError::BadArg(format!(
            "path too long ({} > {})",
            len, MAX_PATH_LEN
        )));
    }
    Ok(())
}

/// Canonical absolute form of a database path.
///
/// The file itself may not exist yet (open with `CREATE`), so a missing
/// final component falls back to canonicalizing the parent directory.
/// Every spelling of one path must resolve identically, otherwise two
/// handles would attach to different coordination headers.
fn canonical_db_path(path: &Path) -> Result<PathBuf, PersError> {
    match path.canonicalize() {
        Ok(path) => Ok(path),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let file_name = path.file_name().ok_or_else(|| {
                PersError::BadArg(format!("path {:?} has no file name", path))
            })?;
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
                _ => std::env::current_dir()?,
            };
            Ok(parent.join(file_name))
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn with_database<T>(
    handle: i32,
    op: impl FnOnce(&mut Database) -> Result<T, PersError>,
) -> Result<T, PersError> {
    let db = registry::lookup(handle)?;
    let mut db = db
        .lock()
        .map_err(|_| PersError::Lock("database mutex poisoned".to_string()))?;
    op(&mut db)
}

/// Open a database, returning a small non-negative handle.
///
/// `CREATE` creates a missing file; without it a missing file fails with
/// `NOT_FOUND`. `CACHED` is accepted and matches the default behaviour.
/// Consecutive opens of the same path yield distinct handles sharing one
/// coordination header.
pub fn open(path: &Path, flags: OpenFlags) -> Result<i32, PersError> {
    check_path(path)?;
    let path = canonical_db_path(path)?;
    let db = Database::open(&path, flags.contains(OpenFlags::CREATE), SyncLevel::File)?;
    registry::insert(db)
}

/// Flush all cached changes and release the handle.
///
/// Close is the only flush point. If the flush fails the handle stays
/// registered in its failed state and the error is surfaced; a second
/// close releases the resources without another flush attempt.
pub fn close(handle: i32) -> Result<(), PersError> {
    with_database(handle, |db| db.close())?;
    registry::remove(handle)
}

/// Store a value under a key, replacing any previous value. Returns the
/// number of bytes accepted.
pub fn write_key(handle: i32, key: &[u8], data: &[u8]) -> Result<usize, PersError> {
    with_database(handle, |db| db.write_key(key, data))
}

/// Read the value stored under a key into `buf`, returning the number of
/// bytes copied (at most `buf.len()`).
pub fn read_key(handle: i32, key: &[u8], buf: &mut [u8]) -> Result<usize, PersError> {
    with_database(handle, |db| db.read_key(key, buf))
}

/// Delete a key. Deleting an absent key succeeds.
pub fn delete_key(handle: i32, key: &[u8]) -> Result<(), PersError> {
    with_database(handle, |db| db.delete_key(key))
}

/// Size of the value stored under a key.
pub fn get_key_size(handle: i32, key: &[u8]) -> Result<usize, PersError> {
    with_database(handle, |db| db.get_key_size(key))
}

/// Byte size of the keys list: every live key plus a NUL terminator.
pub fn get_keys_list_size(handle: i32) -> Result<usize, PersError> {
    with_database(handle, |db| db.get_keys_list_size())
}

/// Write the keys list into `buf` as NUL-terminated names, one entry per
/// live key in unspecified order. Returns the number of bytes written.
pub fn get_keys_list(handle: i32, buf: &mut [u8]) -> Result<usize, PersError> {
    with_database(handle, |db| db.get_keys_list(buf))
}
