use std::fs;
use std::path::Path;

use crate::{Config, Store};

/// Opens a store with the given rotation threshold and sync flag.
pub fn open_store(dir: &Path, max_file_size: u64, sync_on_write: bool) -> Store {
    Store::open(Config {
        data_dir: dir.to_path_buf(),
        sync_on_write,
        max_file_size,
    })
    .unwrap()
}

/// File names in `dir` matching a prefix and suffix, sorted.
pub fn files_with(dir: &Path, prefix: &str, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| n.starts_with(prefix) && n.ends_with(suffix))
        .collect();
    names.sort();
    names
}

/// Every `.log` file in `dir`, sorted by name.
pub fn log_files(dir: &Path) -> Vec<String> {
    files_with(dir, "", ".log")
}

/// Counts put records for `key` across every segment file in `dir`.
pub fn count_put_records_for(dir: &Path, key: &[u8]) -> usize {
    let mut count = 0;
    for name in log_files(dir) {
        for frame in record::SegmentScanner::open(&dir.join(&name)).unwrap() {
            if let record::Record::Put { key: k, .. } = frame.unwrap().record {
                if k == key {
                    count += 1;
                }
            }
        }
    }
    count
}
