use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use percom::api;
use percom::{OpenFlags, PersError};
use percom_datastore::file_format::{
    HEADER_SIZE, SLOT_COPY_A_OFFSET, SLOT_COPY_B_OFFSET, TABLE_SIZE,
};

fn test_db(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "percom-corruption-{}-{}.db",
        name,
        std::process::id()
    ));
    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
    path
}

// offset of the one record slot in a freshly created single-key database
fn first_slot() -> u64 {
    (HEADER_SIZE + TABLE_SIZE) as u64
}

fn flip_byte(path: &PathBuf, offset: u64) {
    let file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut byte = [0u8; 1];
    file.read_exact_at(&mut byte, offset).unwrap();
    byte[0] ^= 0xff;
    file.write_all_at(&byte, offset).unwrap();
}

fn write_single_key(path: &PathBuf) {
    let handle = api::open(path, OpenFlags::CREATE).unwrap();
    api::write_key(handle, b"fragile", b"SURVIVES-TORN-WRITES").unwrap();
    api::close(handle).unwrap();
}

#[test]
fn primary_copy_corruption_is_recovered() {
    let path = test_db("primary");
    write_single_key(&path);

    // one byte inside the primary value region
    flip_byte(&path, first_slot() + SLOT_COPY_A_OFFSET as u64 + 4 + 3);

    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    let mut buf = [0u8; 64];
    let count = api::read_key(handle, b"fragile", &mut buf).unwrap();
    assert_eq!(&buf[..count], b"SURVIVES-TORN-WRITES");
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn backup_copy_corruption_is_recovered() {
    let path = test_db("backup");
    write_single_key(&path);

    flip_byte(&path, first_slot() + SLOT_COPY_B_OFFSET as u64 + 4 + 3);

    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    let mut buf = [0u8; 64];
    let count = api::read_key(handle, b"fragile", &mut buf).unwrap();
    assert_eq!(&buf[..count], b"SURVIVES-TORN-WRITES");
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn damaged_checksum_falls_back_to_backup() {
    let path = test_db("crc");
    write_single_key(&path);

    // hit the stored CRC instead of the payload
    flip_byte(
        &path,
        first_slot() + SLOT_COPY_A_OFFSET as u64 + 4 + percom::MAX_VALUE_LEN as u64,
    );

    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    let mut buf = [0u8; 64];
    let count = api::read_key(handle, b"fragile", &mut buf).unwrap();
    assert_eq!(&buf[..count], b"SURVIVES-TORN-WRITES");
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn both_copies_corrupt_fails_without_output() {
    let path = test_db("both");
    write_single_key(&path);

    flip_byte(&path, first_slot() + SLOT_COPY_A_OFFSET as u64 + 4 + 3);
    flip_byte(&path, first_slot() + SLOT_COPY_B_OFFSET as u64 + 4 + 3);

    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    let mut buf = [0xaau8; 64];
    let err = api::read_key(handle, b"fragile", &mut buf).unwrap_err();
    assert_eq!(err.code(), percom_api_types::ERR_CORRUPT);

    // the caller buffer must be untouched
    assert!(buf.iter().all(|&b| b == 0xaa));

    // the handle is latched into its failed state, close still works
    assert!(matches!(
        api::get_keys_list_size(handle),
        Err(PersError::Io(_))
    ));
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn unknown_version_is_rejected() {
    let path = test_db("version");
    write_single_key(&path);

    // version field sits after the 8 byte magic
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.write_all_at(&99u32.to_le_bytes(), 8).unwrap();

    let err = api::open(&path, OpenFlags::empty()).unwrap_err();
    assert_eq!(err.code(), percom_api_types::ERR_VERSION);

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn unknown_magic_is_rejected() {
    let path = test_db("magic");
    write_single_key(&path);

    flip_byte(&path, 0);

    assert!(matches!(
        api::open(&path, OpenFlags::empty()),
        Err(PersError::Corrupt(_))
    ));

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}
