use super::helpers::*;
use crate::StoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

// Readers never take the write mutex, so point reads and scans must stay
// correct while a writer rotates segments and merges underneath them.

#[test]
fn concurrent_readers_during_writes_and_merges() {
    let dir = tempdir().unwrap();
    // tiny threshold: the writer rotates constantly, exercising the
    // stale-active-locator retry in the read path
    let store = Arc::new(open_store(dir.path(), 64, false));

    for i in 0..10u32 {
        store
            .put(format!("k{}", i).into_bytes(), b"v0".to_vec())
            .unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|reader| {
            let store = Arc::clone(&store);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut reads = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    let key = format!("k{}", (reader + reads) % 10).into_bytes();
                    match store.get(&key) {
                        Ok(value) => {
                            assert!(
                                value.starts_with(b"v"),
                                "read a value that was never written: {:?}",
                                value
                            );
                        }
                        Err(StoreError::NotFound) => {} // deleted at that instant
                        Err(e) => panic!("reader failed: {}", e),
                    }
                    reads += 1;
                }
                assert!(reads > 0);
            })
        })
        .collect();

    let scanner = {
        let store = Arc::clone(&store);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let mut previous: Option<Vec<u8>> = None;
                for item in store.scan(b"k", b"l") {
                    let (key, value) = item.unwrap();
                    if let Some(ref prev) = previous {
                        assert!(prev < &key, "scan keys must stay ascending");
                    }
                    assert!(value.starts_with(b"v"));
                    previous = Some(key);
                }
            }
        })
    };

    // writer: overwrites, deletes, re-inserts, merges
    for round in 1..=50u32 {
        for i in 0..10u32 {
            store
                .put(
                    format!("k{}", i).into_bytes(),
                    format!("v{}", round).into_bytes(),
                )
                .unwrap();
        }
        if round % 10 == 0 {
            store.delete(format!("k{}", round % 10).into_bytes()).unwrap();
            store.merge().unwrap();
        }
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
    scanner.join().unwrap();

    // final state: every key holds the last round's value, except the one
    // deleted in the final merge round
    for i in 0..10u32 {
        let key = format!("k{}", i).into_bytes();
        match store.get(&key) {
            Ok(value) => assert_eq!(value, b"v50"),
            Err(StoreError::NotFound) => assert_eq!(i, 0, "only k0 was deleted last"),
            Err(e) => panic!("{}", e),
        }
    }
}

#[test]
fn writers_from_many_threads_serialize() {
    let dir = tempdir().unwrap();
    let store = Arc::new(open_store(dir.path(), 256, false));

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..50u32 {
                    store
                        .put(
                            format!("w{}-{:02}", w, i).into_bytes(),
                            format!("v{}", i).into_bytes(),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(store.key_count(), 200);
    for w in 0..4 {
        for i in 0..50u32 {
            assert_eq!(
                store.get(format!("w{}-{:02}", w, i).as_bytes()).unwrap(),
                format!("v{}", i).into_bytes()
            );
        }
    }
}
