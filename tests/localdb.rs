use std::collections::BTreeSet;
use std::path::PathBuf;

use percom::api;
use percom::{OpenFlags, PersError};

fn test_db(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "percom-localdb-{}-{}.db",
        name,
        std::process::id()
    ));
    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
    path
}

#[test]
fn round_trip_through_close() {
    let path = test_db("roundtrip");

    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    for i in 0..300usize {
        let key = format!("Key_in_loop_{}_{}", i, i * i);
        let data = format!("DATA-{}-{}", i, i * i);
        assert_eq!(
            api::write_key(handle, key.as_bytes(), data.as_bytes()).unwrap(),
            data.len()
        );
    }

    // served from the cache before close
    let mut buf = [0u8; 64];
    for i in 0..300usize {
        let key = format!("Key_in_loop_{}_{}", i, i * i);
        let data = format!("DATA-{}-{}", i, i * i);
        let count = api::read_key(handle, key.as_bytes(), &mut buf).unwrap();
        assert_eq!(&buf[..count], data.as_bytes());
    }
    api::close(handle).unwrap();

    // served from the file after reopen
    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    for i in 0..300usize {
        let key = format!("Key_in_loop_{}_{}", i, i * i);
        let data = format!("DATA-{}-{}", i, i * i);
        assert_eq!(
            api::get_key_size(handle, key.as_bytes()).unwrap(),
            data.len()
        );
        let count = api::read_key(handle, key.as_bytes(), &mut buf).unwrap();
        assert_eq!(&buf[..count], data.as_bytes());
    }
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn table_chain_growth() {
    let path = test_db("chain-growth");

    // enough keys to push the first hash table past its fill limit
    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    for i in 0..500usize {
        let key = format!("chain_key_{}", i);
        api::write_key(handle, key.as_bytes(), b"chained").unwrap();
    }
    api::close(handle).unwrap();

    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    let mut buf = [0u8; 16];
    for i in 0..500usize {
        let key = format!("chain_key_{}", i);
        let count = api::read_key(handle, key.as_bytes(), &mut buf).unwrap();
        assert_eq!(&buf[..count], b"chained");
    }
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn cache_coherence() {
    let path = test_db("coherence");

    let handle = api::open(&path, OpenFlags::CREATE | OpenFlags::CACHED).unwrap();
    api::write_key(handle, b"status/open_document", b"/docs/manual.pdf").unwrap();

    let mut buf = [0u8; 64];
    let count = api::read_key(handle, b"status/open_document", &mut buf).unwrap();
    assert_eq!(&buf[..count], b"/docs/manual.pdf");

    // an overwrite is visible immediately
    api::write_key(handle, b"status/open_document", b"/docs/other.pdf").unwrap();
    let count = api::read_key(handle, b"status/open_document", &mut buf).unwrap();
    assert_eq!(&buf[..count], b"/docs/other.pdf");

    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn partial_read_buffer() {
    let path = test_db("partial");

    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    api::write_key(handle, b"key", b"0123456789").unwrap();

    let mut small = [0u8; 4];
    assert_eq!(api::read_key(handle, b"key", &mut small).unwrap(), 4);
    assert_eq!(&small, b"0123");

    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn delete_semantics() {
    let path = test_db("delete");
    let keys: Vec<String> = (1..=6).map(|i| format!("key{}", i)).collect();

    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    let mut buf = [0u8; 32];
    for key in &keys {
        api::write_key(handle, key.as_bytes(), b"to be removed").unwrap();
        api::delete_key(handle, key.as_bytes()).unwrap();
        assert!(matches!(
            api::read_key(handle, key.as_bytes(), &mut buf),
            Err(PersError::NotFound)
        ));
    }

    // rewrite and persist them
    for key in &keys {
        api::write_key(handle, key.as_bytes(), b"persisted").unwrap();
    }
    api::close(handle).unwrap();

    // delete the persisted records and make that stick over a reopen
    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    for key in &keys {
        api::delete_key(handle, key.as_bytes()).unwrap();
        assert!(matches!(
            api::read_key(handle, key.as_bytes(), &mut buf),
            Err(PersError::NotFound)
        ));
    }
    api::close(handle).unwrap();

    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    for key in &keys {
        assert!(matches!(
            api::read_key(handle, key.as_bytes(), &mut buf),
            Err(PersError::NotFound)
        ));
    }
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn delete_is_idempotent() {
    let path = test_db("idempotent");

    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    api::delete_key(handle, b"never_written").unwrap();
    api::delete_key(handle, b"never_written").unwrap();
    api::close(handle).unwrap();

    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    api::delete_key(handle, b"never_written").unwrap();
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

fn parse_keys_list(buf: &[u8]) -> BTreeSet<Vec<u8>> {
    buf.split(|&b| b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| part.to_vec())
        .collect()
}

#[test]
fn keys_list() {
    let path = test_db("keyslist");

    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    api::write_key(handle, b"key_123", b"value one").unwrap();
    api::write_key(handle, b"key_456", b"value two").unwrap();
    api::write_key(handle, b"key_789", b"value three").unwrap();

    // three 7 byte keys, each NUL-terminated
    assert_eq!(api::get_keys_list_size(handle).unwrap(), 24);

    let mut buf = [0u8; 24];
    assert_eq!(api::get_keys_list(handle, &mut buf).unwrap(), 24);
    let listed = parse_keys_list(&buf);
    assert_eq!(listed.len(), 3);
    assert!(listed.contains(b"key_123".as_slice()));
    assert!(listed.contains(b"key_456".as_slice()));
    assert!(listed.contains(b"key_789".as_slice()));

    // a too small buffer is rejected
    let mut small = [0u8; 23];
    assert!(matches!(
        api::get_keys_list(handle, &mut small),
        Err(PersError::BadArg(_))
    ));

    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn keys_list_deduplicates_and_drops_tombstones() {
    let path = test_db("keyslist-dedup");

    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    api::write_key(handle, b"stable", b"v1").unwrap();
    api::write_key(handle, b"doomed", b"v1").unwrap();
    api::close(handle).unwrap();

    let handle = api::open(&path, OpenFlags::empty()).unwrap();
    // on disk and dirty in the cache, must still appear once
    api::write_key(handle, b"stable", b"v2").unwrap();
    api::delete_key(handle, b"doomed").unwrap();
    api::write_key(handle, b"fresh", b"cache only").unwrap();

    let size = api::get_keys_list_size(handle).unwrap();
    assert_eq!(size, "stable".len() + 1 + "fresh".len() + 1);

    let mut buf = vec![0u8; size];
    assert_eq!(api::get_keys_list(handle, &mut buf).unwrap(), size);
    let listed = parse_keys_list(&buf);
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(b"stable".as_slice()));
    assert!(listed.contains(b"fresh".as_slice()));

    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn open_flag_handling() {
    let path = test_db("flags");

    // neither plain open nor CACHED alone may create the file
    assert!(matches!(
        api::open(&path, OpenFlags::empty()),
        Err(PersError::NotFound)
    ));
    assert!(matches!(
        api::open(&path, OpenFlags::CACHED),
        Err(PersError::NotFound)
    ));
    assert!(!path.exists());

    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    api::close(handle).unwrap();

    // now a plain open succeeds, and CREATE on an existing file is a no-op
    let handle = api::open(&path, OpenFlags::CACHED).unwrap();
    api::close(handle).unwrap();
    let handle = api::open(&path, OpenFlags::CREATE | OpenFlags::CACHED).unwrap();
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn consecutive_opens_get_distinct_handles() {
    let path = test_db("consecutive");

    let first = api::open(&path, OpenFlags::CREATE).unwrap();
    let second = api::open(&path, OpenFlags::CREATE).unwrap();
    assert_ne!(first, second);

    // handles are independent: the second one must not see unflushed
    // writes of the first
    api::write_key(first, b"private", b"unflushed").unwrap();
    let mut buf = [0u8; 16];
    assert!(matches!(
        api::read_key(second, b"private", &mut buf),
        Err(PersError::NotFound)
    ));

    api::close(first).unwrap();
    let count = api::read_key(second, b"private", &mut buf).unwrap();
    assert_eq!(&buf[..count], b"unflushed");
    api::close(second).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn argument_rejection_has_no_side_effects() {
    let path = test_db("badargs");

    let handle = api::open(&path, OpenFlags::CREATE).unwrap();
    api::write_key(handle, b"canary", b"untouched").unwrap();
    let baseline = api::get_keys_list_size(handle).unwrap();

    let long_key = [b'k'; percom::MAX_KEY_LEN + 1];
    let big_value = vec![b'v'; percom::MAX_VALUE_LEN + 1];
    let mut buf = [0u8; 16];
    let mut empty: [u8; 0] = [];

    assert!(matches!(
        api::write_key(handle, b"", b"value"),
        Err(PersError::BadArg(_))
    ));
    assert!(matches!(
        api::write_key(handle, &long_key, b"value"),
        Err(PersError::BadArg(_))
    ));
    assert!(matches!(
        api::write_key(handle, b"key", b""),
        Err(PersError::BadArg(_))
    ));
    assert!(matches!(
        api::write_key(handle, b"key", &big_value),
        Err(PersError::BadArg(_))
    ));
    assert!(matches!(
        api::read_key(handle, b"canary", &mut empty),
        Err(PersError::BadArg(_))
    ));
    assert!(matches!(
        api::read_key(handle, &long_key, &mut buf),
        Err(PersError::BadArg(_))
    ));
    assert!(matches!(
        api::delete_key(handle, b""),
        Err(PersError::BadArg(_))
    ));

    // bad handles
    assert!(matches!(
        api::read_key(-1, b"canary", &mut buf),
        Err(PersError::BadArg(_))
    ));
    assert!(matches!(
        api::read_key(9999, b"canary", &mut buf),
        Err(PersError::NoHandle(_))
    ));

    // nothing above may have changed any state
    assert_eq!(api::get_keys_list_size(handle).unwrap(), baseline);
    let count = api::read_key(handle, b"canary", &mut buf).unwrap();
    assert_eq!(&buf[..count], b"untouched");
    api::close(handle).unwrap();

    if let Err(_e) = std::fs::remove_file(&path) { /* ignore */ }
}

#[test]
fn error_codes_are_stable() {
    let path = test_db("codes");

    assert_eq!(
        api::open(&path, OpenFlags::empty()).unwrap_err().code(),
        percom_api_types::ERR_NOT_FOUND
    );
    assert_eq!(
        api::read_key(-1, b"key", &mut [0u8; 4]).unwrap_err().code(),
        percom_api_types::ERR_BAD_ARG
    );
    assert_eq!(
        api::close(9999).unwrap_err().code(),
        percom_api_types::ERR_NO_HANDLE
    );
}
