//! Write path: `put()`, `delete()`, `batch_put()`, and rotation.
//!
//! All mutations flow through this module under the single write mutex. Each
//! record is appended to the active segment, optionally fsync'd, and then
//! made visible by updating the keydir. When an append would push the active
//! segment past `max_file_size`, rotation runs first: the active file is
//! renamed to an immutable `data_<ts>.log` and a fresh active segment starts.

use std::fs::{self, File, OpenOptions};
use std::io::Write;

use keydir::Locator;

use crate::error::{Result, StoreError};
use crate::segment::ACTIVE;
use crate::{Store, WriterState, MAX_KEY_SIZE, MAX_VALUE_SIZE};

impl Store {
    /// Inserts a key-value pair.
    ///
    /// The record is appended to the active segment (rotating first if the
    /// size threshold would be crossed), fsync'd when `sync_on_write` is set,
    /// and then published in the keydir. Earlier records for the key become
    /// garbage until the next merge.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        check_key(&key)?;
        check_value(&value)?;

        let mut state = self.writer.lock();
        let locator = self.append_put(&mut state, &key, &value)?;
        if self.sync_on_write {
            state.active_file()?.sync_all()?;
        }
        self.keydir.insert(key.clone(), locator);
        state.notify(|observer| observer.on_put(&key, &value));
        Ok(())
    }

    /// Writes a batch of key-value pairs under one hold of the write mutex.
    ///
    /// Entries become visible to readers one by one as they are appended —
    /// the batch is not a transaction. Rotation may happen mid-batch. With
    /// `sync_on_write`, a single fsync covers the whole batch.
    pub fn batch_put(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        for (key, value) in &entries {
            check_key(key)?;
            check_value(value)?;
        }

        let mut state = self.writer.lock();
        for (key, value) in &entries {
            let locator = self.append_put(&mut state, key, value)?;
            self.keydir.insert(key.clone(), locator);
        }
        if self.sync_on_write && !entries.is_empty() {
            state.active_file()?.sync_all()?;
        }
        state.notify(|observer| observer.on_batch_put(&entries));
        Ok(())
    }

    /// Deletes a key.
    ///
    /// Appends a tombstone that masks older records for the key during
    /// replay, and removes the keydir entry. Deleting an absent key is a
    /// successful no-op: no record is appended and the observer is not
    /// notified.
    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        check_key(&key)?;

        let mut state = self.writer.lock();
        if !self.keydir.contains_key(&key) {
            return Ok(());
        }

        let frame_len = record::tombstone_frame_len(key.len());
        self.rotate_if_needed(&mut state, frame_len)?;

        state.buf.clear();
        record::encode_tombstone(&mut state.buf, &key);
        write_frame(&mut state)?;
        state.offset += frame_len;

        if self.sync_on_write {
            state.active_file()?.sync_all()?;
        }
        self.keydir.remove(&key);
        state.notify(|observer| observer.on_delete(&key));
        Ok(())
    }

    /// Appends one put record, returning the locator of its value payload in
    /// the active segment. Does not sync and does not touch the keydir.
    fn append_put(&self, state: &mut WriterState, key: &[u8], value: &[u8]) -> Result<Locator> {
        let frame_len = record::put_frame_len(key.len(), value.len());
        self.rotate_if_needed(state, frame_len)?;

        let start = state.offset;
        state.buf.clear();
        record::encode_put(&mut state.buf, key, value);
        write_frame(state)?;
        state.offset = start + frame_len;

        Ok(Locator {
            segment: ACTIVE.to_string(),
            value_offset: start + record::value_offset_in_frame(key.len()),
            value_len: value.len() as u32,
        })
    }

    fn rotate_if_needed(&self, state: &mut WriterState, frame_len: u64) -> Result<()> {
        // an oversize record on an empty active segment is written as-is;
        // rotating first would only leave an empty immutable segment behind
        if state.offset > 0 && state.offset + frame_len > self.max_file_size {
            self.rotate(state)?;
        }
        Ok(())
    }

    /// Retires the active segment and starts a fresh one.
    ///
    /// Steps, all under the held write mutex:
    ///
    /// 1. Close the active handle (some platforms refuse to rename open
    ///    files).
    /// 2. Rename `active.log` → `data_<ts>.log`. The bytes are unchanged, so
    ///    every existing locator stays byte-accurate.
    /// 3. Repoint every keydir locator that still names `active.log` at the
    ///    rotated name. This happens *before* a new `active.log` exists, so a
    ///    concurrent reader holding a stale locator sees a missing file and
    ///    retries — it can never read wrong bytes from the new empty active.
    /// 4. Open a fresh, empty `active.log`.
    ///
    /// If the rename fails the original file is reopened so the store stays
    /// writable, and [`StoreError::RotationFailed`] is returned.
    fn rotate(&self, state: &mut WriterState) -> Result<()> {
        let rotated = state.namer.rotated_name();
        let active_path = self.dir.join(ACTIVE);

        drop(state.file.take());

        if let Err(e) = fs::rename(&active_path, self.dir.join(&rotated)) {
            match OpenOptions::new().create(true).append(true).open(&active_path) {
                Ok(file) => state.file = Some(file),
                Err(reopen) => {
                    tracing::warn!("could not reopen {} after failed rotation: {}", ACTIVE, reopen);
                }
            }
            return Err(StoreError::RotationFailed(e.to_string()));
        }

        let moved = self.keydir.retarget_segment(ACTIVE, &rotated);
        tracing::debug!(
            "rotated {} to {} ({} locators repointed)",
            ACTIVE,
            rotated,
            moved
        );

        state.file = Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&active_path)?,
        );
        state.offset = 0;
        Ok(())
    }
}

/// Writes the frame staged in `state.buf` to the active segment.
fn write_frame(state: &mut WriterState) -> Result<()> {
    let WriterState { file, buf, .. } = state;
    let file: &mut File = match file.as_mut() {
        Some(file) => file,
        None => {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "active segment is not open after a failed rotation",
            )))
        }
    };
    file.write_all(buf)?;
    Ok(())
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_SIZE {
        return Err(StoreError::InvalidKeySize(key.len()));
    }
    Ok(())
}

fn check_value(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(StoreError::InvalidValueSize(value.len()));
    }
    Ok(())
}

impl WriterState {
    /// Runs `f` against the registered observer, if any, logging failures.
    /// Observer errors never fail the write that triggered them.
    pub(crate) fn notify(
        &mut self,
        f: impl FnOnce(&mut dyn crate::WriteObserver) -> anyhow::Result<()>,
    ) {
        if let Some(observer) = self.observer.as_mut() {
            if let Err(e) = f(observer.as_mut()) {
                tracing::warn!("write observer failed: {:#}", e);
            }
        }
    }
}
