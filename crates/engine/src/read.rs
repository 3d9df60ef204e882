//! Read path: `get()`, `scan()`, and `list_keys()`.
//!
//! Reads never take the write mutex. A point read resolves the key through
//! the keydir, then opens the named segment read-only and fetches exactly the
//! value bytes. Segments are opened per call; the OS page cache makes the
//! repeat opens cheap, and holding no handles means compaction can unlink
//! retired segments without coordination.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use keydir::Locator;

use crate::error::{Result, StoreError};
use crate::Store;

impl Store {
    /// Looks up the value for `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the key is absent; [`StoreError::Io`] if
    /// the segment read fails.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let locator = self.keydir.get(key).ok_or(StoreError::NotFound)?;
        match self.read_value(&locator) {
            Ok(value) => Ok(value),
            // The locator can go stale between lookup and read: a rotation
            // repoints active-segment locators at the rotated file, and a
            // merge repoints input-segment locators before deleting the
            // inputs. Both publish the fresh locator first, so one
            // re-resolve settles either case.
            Err(first) => match self.keydir.get(key) {
                Some(fresh) if fresh != locator => self.read_value(&fresh),
                Some(_) => Err(first),
                None => Err(StoreError::NotFound),
            },
        }
    }

    /// Lazily yields every `(key, value)` pair with key in `[lo, hi)`, in
    /// ascending key order.
    ///
    /// The keys and locators are snapshotted from the keydir when `scan` is
    /// called; values are read from disk as the iterator is driven. The
    /// sequence is not transactional across concurrent writes: a key deleted
    /// after the snapshot is skipped, and a key overwritten after the
    /// snapshot may yield the newer value.
    pub fn scan(&self, lo: &[u8], hi: &[u8]) -> Scan<'_> {
        Scan {
            store: self,
            entries: self.keydir.range(lo, hi).into_iter(),
        }
    }

    /// All live keys, sorted.
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        self.keydir.keys()
    }

    /// Fetches the value bytes a locator points at.
    pub(crate) fn read_value(&self, locator: &Locator) -> Result<Vec<u8>> {
        let mut file = File::open(self.dir.join(&locator.segment))?;
        file.seek(SeekFrom::Start(locator.value_offset))?;
        let mut value = vec![0u8; locator.value_len as usize];
        file.read_exact(&mut value)?;
        Ok(value)
    }
}

/// Lazy range iterator returned by [`Store::scan`].
pub struct Scan<'a> {
    store: &'a Store,
    entries: std::vec::IntoIter<(Vec<u8>, Locator)>,
}

impl Iterator for Scan<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, locator) = self.entries.next()?;
            match self.store.read_value(&locator) {
                Ok(value) => return Some(Ok((key, value))),
                // stale snapshot locator (rotation or overwrite since the
                // scan started): fall back to a fresh point lookup
                Err(_) => match self.store.get(&key) {
                    Ok(value) => return Some(Ok((key, value))),
                    Err(StoreError::NotFound) => continue,
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }
}
