//! # Engine - CinderKV Storage Engine
//!
//! An embeddable, persistent key-value store over an append-only log: the
//! Bitcask design. Every mutation is appended as a record to the active
//! segment file; an in-memory [`keydir`] pins each live key to the exact
//! file/offset/length of its current value, so a read is one index lookup
//! plus one `seek` + `read`.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   STORE                       │
//! │                                               │
//! │ write.rs → append to active.log → keydir      │
//! │              |                                │
//! │              |  (size threshold exceeded?)    │
//! │              |            yes                 │
//! │              v                                │
//! │        rotate → data_<ts>.log (immutable)     │
//! │                                               │
//! │ compaction.rs → merge() → merged_<ts>.log     │
//! │                           + .hint sidecar     │
//! │                                               │
//! │ read.rs → keydir → seek/read in named segment │
//! │ recovery.rs → replay hints + segments on open │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                                |
//! |----------------|--------------------------------------------------------|
//! | [`lib.rs`]     | `Store` struct, `open`, `close`, `sync`, `Drop`        |
//! | [`config`]     | `Config` options and validation                        |
//! | [`error`]      | `StoreError` / `Result`                                |
//! | [`segment`]    | Segment naming, ordering, directory listing            |
//! | [`write`]      | `put()`, `delete()`, `batch_put()`, rotation           |
//! | [`read`]       | `get()`, `scan()`, `list_keys()`                       |
//! | [`recovery`]   | Keydir rebuild on open (hints or full replay)          |
//! | [`compaction`] | `merge()`: rewrite immutables, emit hint, drop inputs  |
//! | [`observer`]   | Write-observation hook for replication glue            |
//!
//! ## Concurrency
//!
//! One `parking_lot::Mutex` serializes every mutation: appends, rotation, and
//! the whole of a merge. Reads never take it — they go through the
//! concurrently readable keydir and open segment files read-only, so point
//! reads and scans proceed while a writer or a merge is running.
//!
//! ## Crash Safety
//!
//! Records become visible in the keydir only after the bytes are written
//! (and, with `sync_on_write`, fsync'd). Rotation is a rename, which keeps
//! every already-written byte reachable under the new name. A merge writes
//! its output through a temp file + fsync + rename and deletes its inputs
//! only after the new locators are installed, so either the inputs or the
//! complete merged segment exist at every instant.

mod compaction;
mod config;
mod error;
mod observer;
mod read;
mod recovery;
mod segment;
mod write;

use keydir::KeyDir;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub use config::Config;
pub use error::{Result, StoreError};
pub use keydir::Locator;
pub use observer::WriteObserver;
pub use read::Scan;

use segment::SegmentNamer;

/// Maximum allowed key size in bytes.
pub const MAX_KEY_SIZE: usize = i32::MAX as usize;
/// Maximum allowed value size in bytes.
pub const MAX_VALUE_SIZE: usize = i32::MAX as usize;

/// The store: an append-only log of segments plus the in-memory keydir.
///
/// # Write Path
///
/// 1. Take the write mutex.
/// 2. If the record would push the active segment past `max_file_size`,
///    rotate: rename `active.log` to `data_<ts>.log`, repoint its keydir
///    locators, start a fresh active segment.
/// 3. Append the record; fsync when `sync_on_write` is set.
/// 4. Update the keydir (insert for put, remove for delete).
/// 5. Notify the write observer, if any.
///
/// # Read Path
///
/// 1. Look the key up in the keydir (no lock).
/// 2. Open the named segment read-only, seek to the value offset, read the
///    value length. Done.
///
/// # Recovery
///
/// On [`Store::open`], immutable segments are replayed oldest-first — via
/// their hint sidecar when one exists — then the active segment, so the last
/// writer of each key wins. See the recovery module for the corruption rules.
///
/// All methods take `&self`; share the store across threads with `Arc`.
pub struct Store {
    dir: PathBuf,
    keydir: KeyDir,
    writer: Mutex<WriterState>,
    sync_on_write: bool,
    max_file_size: u64,
}

/// Everything the single writer owns, guarded by the write mutex.
pub(crate) struct WriterState {
    /// Append handle for `active.log`. `None` only transiently, when a failed
    /// rotation could not reopen it.
    file: Option<File>,
    /// Append offset; equals the active segment's length.
    offset: u64,
    /// Reusable frame scratch buffer.
    buf: Vec<u8>,
    namer: SegmentNamer,
    observer: Option<Box<dyn WriteObserver>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("dir", &self.dir)
            .field("keys", &self.keydir.len())
            .field("sync_on_write", &self.sync_on_write)
            .field("max_file_size", &self.max_file_size)
            .finish()
    }
}

impl Store {
    /// Opens (or creates) a store in `config.data_dir`, rebuilding the keydir
    /// from the segments on disk.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Config`] for an invalid `max_file_size` or an unusable
    ///   data directory.
    /// * [`StoreError::CorruptSegment`] if an immutable segment fails replay.
    /// * [`StoreError::Io`] for any other filesystem failure.
    pub fn open(config: Config) -> Result<Store> {
        config.validate()?;
        let Config {
            data_dir: dir,
            sync_on_write,
            max_file_size,
        } = config;

        std::fs::create_dir_all(&dir).map_err(|e| {
            StoreError::Config(format!(
                "data directory {} is not usable: {}",
                dir.display(),
                e
            ))
        })?;

        let keydir = KeyDir::new();
        let offset = recovery::rebuild(&dir, &keydir)?;

        // Seed the name allocator from what's already on disk so a restart
        // can never re-issue a segment name.
        let namer = SegmentNamer::seeded(&dir)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(segment::ACTIVE))?;

        tracing::debug!(
            "opened store at {} with {} keys, active offset {}",
            dir.display(),
            keydir.len(),
            offset
        );

        Ok(Store {
            dir,
            keydir,
            writer: Mutex::new(WriterState {
                file: Some(file),
                offset,
                buf: Vec::with_capacity(256),
                namer,
                observer: None,
            }),
            sync_on_write,
            max_file_size,
        })
    }

    /// Registers the write-observation hook.
    ///
    /// The observer runs synchronously under the write mutex after each
    /// successful append; its errors are logged and never fail the
    /// originating write. Replaces any previously registered observer.
    pub fn set_observer(&self, observer: Box<dyn WriteObserver>) {
        let mut state = self.writer.lock();
        state.observer = Some(observer);
    }

    /// Forces an fsync of the active segment, regardless of `sync_on_write`.
    pub fn sync(&self) -> Result<()> {
        let mut state = self.writer.lock();
        state.active_file()?.sync_all()?;
        Ok(())
    }

    /// Syncs and consumes the store.
    ///
    /// Dropping the store syncs best-effort; `close` is the variant that
    /// reports the error.
    pub fn close(self) -> Result<()> {
        self.sync()
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        self.keydir.len()
    }

    /// The data directory this store runs in.
    pub fn data_dir(&self) -> &Path {
        &self.dir
    }
}

/// Best-effort sync on drop; the checked path is [`Store::close`].
impl Drop for Store {
    fn drop(&mut self) {
        if let Some(file) = self.writer.lock().file.as_ref() {
            let _ = file.sync_all();
        }
    }
}

impl WriterState {
    /// The active append handle, or an error if a failed rotation left the
    /// store without one.
    fn active_file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "active segment is not open after a failed rotation",
            ))
        })
    }
}

#[cfg(test)]
mod tests;
