//! Operations of the resource configuration table.
//!
//! The table is the same storage engine as the local database, reached
//! through the fixed shape [`ResourceConfig`] record: records cross the
//! engine as their little-endian byte image, the engine itself stays
//! agnostic of their content.

use percom_api_types::{PersError, ResourceConfig, RESOURCE_CONFIG_SIZE};

use crate::api::with_database;

/// Store the configuration record of a resource, replacing any previous
/// record. Returns the stored record size.
pub fn write(handle: i32, resource_id: &[u8], config: &ResourceConfig) -> Result<usize, PersError> {
    let image = config.to_bytes()?;
    with_database(handle, |db| db.write_key(resource_id, &image))
}

/// Read the configuration record of a resource.
pub fn read(handle: i32, resource_id: &[u8]) -> Result<ResourceConfig, PersError> {
    with_database(handle, |db| {
        let size = db.get_key_size(resource_id)?;
        if size != RESOURCE_CONFIG_SIZE {
            return Err(PersError::Corrupt(format!(
                "resource record has size {} (expected {})",
                size, RESOURCE_CONFIG_SIZE
            )));
        }
        let mut image = vec![0u8; RESOURCE_CONFIG_SIZE];
        db.read_key(resource_id, &mut image)?;
        ResourceConfig::from_bytes(&image)
    })
}

/// Delete the configuration record of a resource. Deleting an absent
/// resource succeeds.
pub fn delete(handle: i32, resource_id: &[u8]) -> Result<(), PersError> {
    with_database(handle, |db| db.delete_key(resource_id))
}

/// Byte size of the resources list: every resource id plus a NUL
/// terminator.
pub fn get_resources_list_size(handle: i32) -> Result<usize, PersError> {
    with_database(handle, |db| db.get_keys_list_size())
}

/// Write the resources list into `buf` as NUL-terminated ids. Returns
/// the number of bytes written.
pub fn get_resources_list(handle: i32, buf: &mut [u8]) -> Result<usize, PersError> {
    with_database(handle, |db| db.get_keys_list(buf))
}
