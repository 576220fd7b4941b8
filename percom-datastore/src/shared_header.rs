use std::hash::Hasher;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ops::DerefMut;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Error};
use nix::sys::stat::Mode;
use twox_hash::XxHash64;

use proxmox_shared_memory::{check_subtype, initialize_subtype};
use proxmox_shared_memory::{Init, SharedMemory, SharedMutex};
use proxmox_sys::fs::CreateOptions;

use percom_api_types::PersError;

use crate::file_format::PERCOM_COORD_MAGIC_1_0;

/// Directory holding the coordination header files (tmpfs).
const SHMEM_DIR: &str = "/dev/shm";

/// Cross-process view of one database file, guarded by the shared mutex.
#[derive(Debug)]
#[repr(C)]
pub struct CoordState {
    /// Number of hash tables currently linked in the database file.
    pub table_count: u32,
    /// Number of live handles attached to this header, across processes.
    pub attach_count: u32,
}

impl Init for CoordState {
    fn initialize(this: &mut MaybeUninit<Self>) {
        this.write(CoordState {
            table_count: 0,
            attach_count: 0,
        });
    }
}

#[repr(C)]
struct CoordHeaderInner {
    magic: [u8; 8],
    state: SharedMutex<CoordState>,
}

#[repr(C)]
union CoordHeaderData {
    data: ManuallyDrop<CoordHeaderInner>,
    _padding: [u8; 4096],
}

#[test]
fn assert_coord_header_size() {
    assert_eq!(std::mem::size_of::<CoordHeaderData>(), 4096);
}

impl std::ops::Deref for CoordHeaderData {
    type Target = CoordHeaderInner;

    #[inline]
    fn deref(&self) -> &CoordHeaderInner {
        unsafe { &self.data }
    }
}

impl std::ops::DerefMut for CoordHeaderData {
    #[inline]
    fn deref_mut(&mut self) -> &mut CoordHeaderInner {
        unsafe { &mut self.data }
    }
}

impl Init for CoordHeaderData {
    fn initialize(this: &mut MaybeUninit<Self>) {
        unsafe {
            let me = &mut *this.as_mut_ptr();
            me.magic = PERCOM_COORD_MAGIC_1_0;
            initialize_subtype(&mut me.state);
        }
    }

    fn check_type_magic(this: &MaybeUninit<Self>) -> Result<(), Error> {
        unsafe {
            let me = &*this.as_ptr();
            if me.magic != PERCOM_COORD_MAGIC_1_0 {
                bail!("CoordHeader: wrong magic number");
            }
            check_subtype(&me.state)?;
            Ok(())
        }
    }
}

/// Shared coordination header of one database path.
///
/// Lives in a tmpfs backed mapping named after a stable hash of the
/// canonical database path, so every process opening the same file
/// attaches to the same region. The header exists as long as at least
/// one handle is attached; the last detach unlinks it.
pub struct CoordHeader {
    shmem: SharedMemory<CoordHeaderData>,
    path: PathBuf,
}

impl CoordHeader {
    /// Attach to the coordination header of `db_path`, creating and
    /// initialising the region if absent.
    pub fn attach(db_path: &Path) -> Result<Self, PersError> {
        let path = Self::shmem_path(db_path);

        let file_opts = CreateOptions::new().perm(Mode::from_bits_truncate(0o660));
        let shmem: SharedMemory<CoordHeaderData> = SharedMemory::open(&path, file_opts)
            .map_err(|err| {
                PersError::Lock(format!(
                    "unable to attach coordination header {:?} - {}",
                    path, err
                ))
            })?;

        let this = Self { shmem, path };
        this.lock().attach_count += 1;
        Ok(this)
    }

    /// Mapping name: hex of a 64 bit hash of the canonical path. The
    /// derivation is deterministic per path but otherwise unspecified;
    /// external tools must not parse it.
    fn shmem_path(db_path: &Path) -> PathBuf {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(db_path.as_os_str().as_bytes());
        let name = hex::encode(hasher.finish().to_le_bytes());
        let mut path = PathBuf::from(SHMEM_DIR);
        path.push(format!("percom-{}.coord", name));
        path
    }

    /// Lock the shared state. Every operation that consults or mutates
    /// the table chain holds this for its duration; flush holds it
    /// across the whole flush sequence.
    pub fn lock(&self) -> impl DerefMut<Target = CoordState> + '_ {
        self.shmem.data().state.lock()
    }
}

impl Drop for CoordHeader {
    fn drop(&mut self) {
        let attached = {
            let mut state = self.shmem.data().state.lock();
            state.attach_count = state.attach_count.saturating_sub(1);
            state.attach_count
        };
        if attached == 0 {
            if let Err(err) = std::fs::remove_file(&self.path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!(
                        "unable to remove stale coordination header {:?} - {}",
                        self.path,
                        err
                    );
                }
            }
        }
    }
}
