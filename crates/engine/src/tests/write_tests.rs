use super::helpers::*;
use crate::{Config, Store, StoreError};
use std::fs;
use tempfile::tempdir;

// --------------------- Basic put / get / delete ---------------------

#[test]
fn put_get_delete_list() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024 * 1024, false);

    store.put(b"a".to_vec(), b"1".to_vec()).unwrap();
    store.put(b"b".to_vec(), b"2".to_vec()).unwrap();

    assert_eq!(store.get(b"a").unwrap(), b"1");
    assert_eq!(store.get(b"b").unwrap(), b"2");

    store.delete(b"a".to_vec()).unwrap();
    assert!(matches!(store.get(b"a"), Err(StoreError::NotFound)));
    assert_eq!(store.list_keys(), vec![b"b".to_vec()]);
}

#[test]
fn overwrite_returns_newest() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024 * 1024, false);

    store.put(b"k".to_vec(), b"v1".to_vec()).unwrap();
    store.put(b"k".to_vec(), b"v2".to_vec()).unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"v2");
    assert_eq!(store.key_count(), 1);
}

#[test]
fn read_your_writes_over_a_sequence() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 256, false);

    for i in 0..100u32 {
        store
            .put(format!("k{:02}", i % 10).into_bytes(), format!("v{}", i).into_bytes())
            .unwrap();
    }
    // last writer of each of the 10 keys was iteration 90 + slot
    for slot in 0..10u32 {
        assert_eq!(
            store.get(format!("k{:02}", slot).as_bytes()).unwrap(),
            format!("v{}", 90 + slot).into_bytes()
        );
    }
}

#[test]
fn empty_value_is_legal() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024, false);

    store.put(b"k".to_vec(), Vec::new()).unwrap();
    assert_eq!(store.get(b"k").unwrap(), Vec::<u8>::new());
}

#[test]
fn binary_keys_and_values() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024, false);

    let key = vec![0x00u8, 0xFF, 0x80];
    let val = vec![0xDEu8, 0xAD, 0xBE, 0xEF];
    store.put(key.clone(), val.clone()).unwrap();
    assert_eq!(store.get(&key).unwrap(), val);
}

// --------------------- Argument bounds ---------------------

#[test]
fn empty_key_is_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024, false);

    assert!(matches!(
        store.put(Vec::new(), b"v".to_vec()),
        Err(StoreError::InvalidKeySize(0))
    ));
    assert!(matches!(
        store.delete(Vec::new()),
        Err(StoreError::InvalidKeySize(0))
    ));
    assert!(matches!(
        store.batch_put(vec![(Vec::new(), b"v".to_vec())]),
        Err(StoreError::InvalidKeySize(0))
    ));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();
    let result = Store::open(Config {
        data_dir: dir.path().to_path_buf(),
        sync_on_write: false,
        max_file_size: 0,
    });
    assert!(matches!(result, Err(StoreError::Config(_))));
}

// --------------------- Delete of an absent key ---------------------

#[test]
fn delete_absent_key_appends_nothing() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024, false);

    store.put(b"keep".to_vec(), b"v".to_vec()).unwrap();
    let len_before = fs::metadata(dir.path().join("active.log")).unwrap().len();

    store.delete(b"ghost".to_vec()).unwrap();
    store.delete(b"ghost".to_vec()).unwrap();

    let len_after = fs::metadata(dir.path().join("active.log")).unwrap().len();
    assert_eq!(len_before, len_after, "no tombstone for an absent key");
}

#[test]
fn double_delete_second_is_noop() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024, false);

    store.put(b"k".to_vec(), b"v".to_vec()).unwrap();
    store.delete(b"k".to_vec()).unwrap();
    let len_after_first = fs::metadata(dir.path().join("active.log")).unwrap().len();

    store.delete(b"k".to_vec()).unwrap();
    let len_after_second = fs::metadata(dir.path().join("active.log")).unwrap().len();
    assert_eq!(len_after_first, len_after_second);
}

// --------------------- Batches ---------------------

#[test]
fn batch_put_all_visible() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024 * 1024, false);

    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..20u32)
        .map(|i| (format!("k{:02}", i).into_bytes(), format!("v{}", i).into_bytes()))
        .collect();
    store.batch_put(entries.clone()).unwrap();

    for (key, value) in &entries {
        assert_eq!(&store.get(key).unwrap(), value);
    }
    assert_eq!(store.key_count(), 20);
}

#[test]
fn batch_put_rotates_mid_batch() {
    let dir = tempdir().unwrap();
    // small threshold: the batch must span several segments
    let store = open_store(dir.path(), 64, false);

    let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..10u32)
        .map(|i| (format!("k{}", i).into_bytes(), vec![b'x'; 16]))
        .collect();
    store.batch_put(entries.clone()).unwrap();

    assert!(
        !files_with(dir.path(), "data_", ".log").is_empty(),
        "batch should have rotated at least once"
    );
    for (key, _) in &entries {
        assert_eq!(store.get(key).unwrap(), vec![b'x'; 16]);
    }
}

#[test]
fn batch_put_with_sync_on_write() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024 * 1024, true);

    store
        .batch_put(vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
        ])
        .unwrap();
    assert_eq!(store.get(b"a").unwrap(), b"1");
    assert_eq!(store.get(b"b").unwrap(), b"2");
}

#[test]
fn empty_batch_is_noop() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 1024, true);
    store.batch_put(Vec::new()).unwrap();
    assert_eq!(store.key_count(), 0);
}

// --------------------- No dangling locators ---------------------

#[test]
fn every_listed_key_is_readable() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 128, false);

    for i in 0..60u32 {
        store
            .put(format!("k{:02}", i % 20).into_bytes(), format!("v{}", i).into_bytes())
            .unwrap();
        if i % 7 == 0 {
            store.delete(format!("k{:02}", (i + 3) % 20).into_bytes()).unwrap();
        }
    }
    store.merge().unwrap();

    for key in store.list_keys() {
        assert!(store.get(&key).is_ok(), "dangling locator for {:?}", key);
    }
}
