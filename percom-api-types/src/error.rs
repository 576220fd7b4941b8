use std::io;

/// Numeric code for [`PersError::BadArg`].
pub const ERR_BAD_ARG: i32 = -1;
/// Numeric code for [`PersError::NoHandle`].
pub const ERR_NO_HANDLE: i32 = -2;
/// Numeric code for [`PersError::NotFound`].
pub const ERR_NOT_FOUND: i32 = -3;
/// Numeric code for [`PersError::Exists`].
pub const ERR_EXISTS: i32 = -4;
/// Numeric code for [`PersError::Io`].
pub const ERR_IO: i32 = -5;
/// Numeric code for [`PersError::Corrupt`].
pub const ERR_CORRUPT: i32 = -6;
/// Numeric code for [`PersError::NoSpace`].
pub const ERR_NO_SPACE: i32 = -7;
/// Numeric code for [`PersError::Lock`].
pub const ERR_LOCK: i32 = -8;
/// Numeric code for [`PersError::Version`].
pub const ERR_VERSION: i32 = -9;

/// Error type of the persistence API.
///
/// Each variant maps to one of the stable negative integers reported at
/// the C compatible boundary (see [`PersError::code`]). The codes are
/// wire-stable; new variants get new codes.
#[derive(thiserror::Error, Debug)]
pub enum PersError {
    #[error("invalid argument - {0}")]
    BadArg(String),
    #[error("handle not open - {0}")]
    NoHandle(String),
    #[error("not found")]
    NotFound,
    #[error("already exists - {0}")]
    Exists(String),
    #[error("I/O error - {0}")]
    Io(String),
    #[error("data corruption - {0}")]
    Corrupt(String),
    #[error("no space left on database - {0}")]
    NoSpace(String),
    #[error("lock failure - {0}")]
    Lock(String),
    #[error("unsupported database format - {0}")]
    Version(String),
}

impl PersError {
    /// The stable numeric code of this error.
    pub fn code(&self) -> i32 {
        match self {
            PersError::BadArg(_) => ERR_BAD_ARG,
            PersError::NoHandle(_) => ERR_NO_HANDLE,
            PersError::NotFound => ERR_NOT_FOUND,
            PersError::Exists(_) => ERR_EXISTS,
            PersError::Io(_) => ERR_IO,
            PersError::Corrupt(_) => ERR_CORRUPT,
            PersError::NoSpace(_) => ERR_NO_SPACE,
            PersError::Lock(_) => ERR_LOCK,
            PersError::Version(_) => ERR_VERSION,
        }
    }
}

impl From<io::Error> for PersError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENOSPC) | Some(libc::EDQUOT) => PersError::NoSpace(err.to_string()),
            _ if err.kind() == io::ErrorKind::NotFound => PersError::NotFound,
            _ => PersError::Io(err.to_string()),
        }
    }
}
