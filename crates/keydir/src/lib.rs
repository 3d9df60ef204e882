//! # Keydir — the in-memory index
//!
//! Maps every live key to a [`Locator`]: the segment file, offset, and length
//! of its current value on disk. The whole read path is one lookup here plus
//! one `seek` + `read` in the named segment.
//!
//! Built on `crossbeam_skiplist::SkipMap`: an ordered map whose readers never
//! block, so point lookups, range iteration, and key enumeration can run from
//! any number of threads while the single writer inserts and removes entries
//! under its own mutex. Per-key operations are atomic; cross-key consistency
//! is the writer's job.

use crossbeam_skiplist::SkipMap;
use std::fmt;
use std::ops::Bound;

/// Where the live value of one key sits on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    /// File name of the segment holding the value, relative to the data
    /// directory.
    pub segment: String,
    /// Absolute offset of the value payload inside that segment.
    pub value_offset: u64,
    /// Length of the value payload.
    pub value_len: u32,
}

/// Ordered, concurrently readable key → [`Locator`] index.
pub struct KeyDir {
    map: SkipMap<Vec<u8>, Locator>,
}

impl KeyDir {
    /// Creates an empty keydir.
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
        }
    }

    /// Inserts or overwrites the locator for `key`.
    pub fn insert(&self, key: Vec<u8>, locator: Locator) {
        self.map.insert(key, locator);
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.map.remove(key).is_some()
    }

    /// Looks up the locator for `key`.
    pub fn get(&self, key: &[u8]) -> Option<Locator> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All keys, in ascending order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of every `(key, locator)` pair with key in `[lo, hi)`, in
    /// ascending key order.
    ///
    /// The snapshot is taken entry by entry as the range is walked; entries
    /// inserted or removed concurrently may or may not appear, but each
    /// returned pair was present at the moment it was read.
    pub fn range(&self, lo: &[u8], hi: &[u8]) -> Vec<(Vec<u8>, Locator)> {
        if lo >= hi {
            return Vec::new();
        }
        self.map
            .range::<[u8], _>((Bound::Included(lo), Bound::Excluded(hi)))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Rewrites every locator naming segment `old` to name `new` instead,
    /// returning how many were rewritten.
    ///
    /// Used after rotation: the rename preserved the bytes under the new
    /// file name, so only the segment field changes.
    pub fn retarget_segment(&self, old: &str, new: &str) -> usize {
        let mut moved = 0;
        for entry in self.map.iter() {
            if entry.value().segment == old {
                let locator = entry.value();
                self.map.insert(
                    entry.key().clone(),
                    Locator {
                        segment: new.to_string(),
                        value_offset: locator.value_offset,
                        value_len: locator.value_len,
                    },
                );
                moved += 1;
            }
        }
        moved
    }
}

impl Default for KeyDir {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDir").field("len", &self.len()).finish()
    }
}
