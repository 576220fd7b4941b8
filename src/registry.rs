use std::sync::{Arc, Mutex, MutexGuard};

use lazy_static::lazy_static;

use percom_api_types::{PersError, MAX_OPEN_DATABASES};
use percom_datastore::Database;

lazy_static! {
    static ref HANDLE_TABLE: Mutex<HandleTable> = Mutex::new(HandleTable::new());
}

/// Process-wide table of open databases, indexed by handle.
struct HandleTable {
    slots: Vec<Option<Arc<Mutex<Database>>>>,
}

impl HandleTable {
    fn new() -> Self {
        Self {
            slots: vec![None; MAX_OPEN_DATABASES],
        }
    }
}

fn handle_table() -> Result<MutexGuard<'static, HandleTable>, PersError> {
    HANDLE_TABLE
        .lock()
        .map_err(|_| PersError::Lock("handle table mutex poisoned".to_string()))
}

/// Register an open database under the lowest free handle.
pub fn insert(db: Database) -> Result<i32, PersError> {
    let mut table = handle_table()?;
    for (idx, slot) in table.slots.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(Arc::new(Mutex::new(db)));
            return Ok(idx as i32);
        }
    }
    Err(PersError::NoHandle(format!(
        "all {} handles in use",
        MAX_OPEN_DATABASES
    )))
}

pub fn lookup(handle: i32) -> Result<Arc<Mutex<Database>>, PersError> {
    if handle < 0 {
        return Err(PersError::BadArg(format!("negative handle {}", handle)));
    }
    let table = handle_table()?;
    table
        .slots
        .get(handle as usize)
        .and_then(|slot| slot.clone())
        .ok_or_else(|| PersError::NoHandle(format!("handle {} not open", handle)))
}

pub fn remove(handle: i32) -> Result<(), PersError> {
    if handle < 0 {
        return Err(PersError::BadArg(format!("negative handle {}", handle)));
    }
    let mut table = handle_table()?;
    match table.slots.get_mut(handle as usize) {
        Some(slot) if slot.is_some() => {
            *slot = None;
            Ok(())
        }
        _ => Err(PersError::NoHandle(format!("handle {} not open", handle))),
    }
}
