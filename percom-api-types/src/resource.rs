use endian_trait::Endian;
use proxmox_io::{ReadExt, WriteExt};

use crate::PersError;

/// Maximum length of the `custom_name` field in bytes.
pub const MAX_CUSTOM_NAME_LEN: usize = 64;
/// Maximum length of the `custom_id` field in bytes.
pub const MAX_CUSTOM_ID_LEN: usize = 64;
/// Maximum length of the `responsible` field in bytes.
pub const MAX_RESPONSIBLE_LEN: usize = 64;

/// Size of the serialized record image in bytes.
pub const RESOURCE_CONFIG_SIZE: usize = 212;

/// Fixed shape configuration record of the resource configuration table.
///
/// The `policy`, `storage`, `resource_type` and `permission` fields are
/// stored and returned verbatim; interpreting them is the business of the
/// policy layer above. The record crosses the storage boundary as its
/// little-endian byte image ([`ResourceConfig::to_bytes`]).
#[derive(Endian, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct ResourceConfig {
    pub policy: u32,
    pub storage: u32,
    pub resource_type: u32,
    pub permission: u32,
    pub max_size: u32,
    pub custom_name: [u8; MAX_CUSTOM_NAME_LEN],
    pub custom_id: [u8; MAX_CUSTOM_ID_LEN],
    pub responsible: [u8; MAX_RESPONSIBLE_LEN],
}
proxmox_lang::static_assert_size!(ResourceConfig, RESOURCE_CONFIG_SIZE);

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            policy: 0,
            storage: 0,
            resource_type: 0,
            permission: 0,
            max_size: 0,
            custom_name: [0u8; MAX_CUSTOM_NAME_LEN],
            custom_id: [0u8; MAX_CUSTOM_ID_LEN],
            responsible: [0u8; MAX_RESPONSIBLE_LEN],
        }
    }
}

fn set_bounded(field: &mut [u8], data: &[u8], what: &str) -> Result<(), PersError> {
    if data.len() > field.len() {
        return Err(PersError::BadArg(format!(
            "{} too long ({} > {})",
            what,
            data.len(),
            field.len()
        )));
    }
    field[..data.len()].copy_from_slice(data);
    field[data.len()..].fill(0);
    Ok(())
}

fn get_bounded(field: &[u8]) -> &[u8] {
    match field.iter().position(|&b| b == 0) {
        Some(len) => &field[..len],
        None => field,
    }
}

impl ResourceConfig {
    pub fn set_custom_name(&mut self, name: &[u8]) -> Result<(), PersError> {
        set_bounded(&mut self.custom_name, name, "custom_name")
    }

    pub fn set_custom_id(&mut self, id: &[u8]) -> Result<(), PersError> {
        set_bounded(&mut self.custom_id, id, "custom_id")
    }

    pub fn set_responsible(&mut self, responsible: &[u8]) -> Result<(), PersError> {
        set_bounded(&mut self.responsible, responsible, "responsible")
    }

    /// The `custom_name` field up to its first NUL byte.
    pub fn custom_name(&self) -> &[u8] {
        get_bounded(&self.custom_name)
    }

    /// The `custom_id` field up to its first NUL byte.
    pub fn custom_id(&self) -> &[u8] {
        get_bounded(&self.custom_id)
    }

    /// The `responsible` field up to its first NUL byte.
    pub fn responsible(&self) -> &[u8] {
        get_bounded(&self.responsible)
    }

    /// Serialize into the little-endian byte image stored on disk.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersError> {
        let mut image = Vec::with_capacity(RESOURCE_CONFIG_SIZE);
        unsafe {
            image.write_le_value(self.clone())?;
        }
        Ok(image)
    }

    /// Deserialize a record image produced by [`ResourceConfig::to_bytes`].
    pub fn from_bytes(image: &[u8]) -> Result<Self, PersError> {
        if image.len() != RESOURCE_CONFIG_SIZE {
            return Err(PersError::Corrupt(format!(
                "unexpected resource record size ({} != {})",
                image.len(),
                RESOURCE_CONFIG_SIZE
            )));
        }
        let mut reader = image;
        let config: ResourceConfig = unsafe { reader.read_le_value()? };
        Ok(config)
    }
}
