//! Embedded key-value persistence for configuration and state data.
//!
//! Two logically distinct stores share one storage engine:
//!
//! * the **local database** ([`api`]) maps opaque binary keys to opaque
//!   binary values, and
//! * the **resource configuration table** ([`rct`]) maps keys to fixed
//!   shape [`ResourceConfig`] records.
//!
//! A database is opened by path and addressed through a small
//! non-negative integer handle afterwards. Writes and deletes collect in
//! a per-handle cache and reach the file when the handle closes; other
//! processes opening the same path coordinate through a shared memory
//! header, so they observe either the full pre-close or the full
//! post-close state of a writer, never a mix. See the `percom-datastore`
//! crate for the on-disk format.
//!
//! All operations return `Result<_, PersError>`; [`PersError::code`]
//! yields the stable negative integer of the C compatible surface.

pub mod api;
pub mod rct;

mod registry;

pub use percom_api_types::{
    OpenFlags, PersError, ResourceConfig, MAX_CUSTOM_ID_LEN, MAX_CUSTOM_NAME_LEN, MAX_KEY_LEN,
    MAX_OPEN_DATABASES, MAX_PATH_LEN, MAX_RESPONSIBLE_LEN, MAX_VALUE_LEN, RESOURCE_CONFIG_SIZE,
};
