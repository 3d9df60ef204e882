//! Keydir rebuild on open.
//!
//! This module handles the cold-start path: walk the immutable segments in
//! chronological order — bulk-loading a hint sidecar when one exists,
//! replaying record-by-record otherwise — then replay the active segment, so
//! the newest record for each key wins.
//!
//! Corruption rules: an unusable tail in the *active* segment (truncated
//! frame, unknown type tag, inconsistent lengths) is expected after a crash —
//! replay stops there, the offset is logged, and the file is truncated to the
//! last good frame boundary so appending resumes cleanly. The same condition
//! in an *immutable* segment means real damage and aborts the open with
//! [`StoreError::CorruptSegment`]. Hints are trusted (merges write them
//! through fsync + rename), but every entry must point inside its segment.

use std::fs::{self, OpenOptions};
use std::path::Path;

use keydir::{KeyDir, Locator};
use record::{Frame, HintScanner, Record, ScanError, SegmentScanner};

use crate::error::{Result, StoreError};
use crate::segment::{self, ACTIVE};

/// Rebuilds `keydir` from the segments in `dir`, returning the append offset
/// for the active segment (its length after any tail truncation).
pub(crate) fn rebuild(dir: &Path, keydir: &KeyDir) -> Result<u64> {
    segment::cleanup_stale_tmp(dir);

    for name in segment::immutable_segments(dir)? {
        let hint_path = dir.join(segment::hint_file_name(&name));
        if hint_path.exists() {
            load_hint(dir, &name, keydir)?;
        } else {
            replay_immutable(dir, &name, keydir)?;
        }
    }

    replay_active(dir, keydir)
}

/// Bulk-loads the hint sidecar of `name`, validating every entry against the
/// segment's length.
fn load_hint(dir: &Path, name: &str, keydir: &KeyDir) -> Result<()> {
    let segment_len = fs::metadata(dir.join(name))?.len();
    let scanner = HintScanner::open(&dir.join(segment::hint_file_name(name)))?;

    for entry in scanner {
        let entry = entry?;
        let end = entry.value_offset.saturating_add(entry.value_len as u64);
        if end > segment_len {
            return Err(StoreError::CorruptSegment {
                segment: name.to_string(),
                offset: entry.value_offset,
                detail: format!(
                    "hint entry points past end of segment ({} > {})",
                    end, segment_len
                ),
            });
        }
        keydir.insert(
            entry.key,
            Locator {
                segment: name.to_string(),
                value_offset: entry.value_offset,
                value_len: entry.value_len,
            },
        );
    }
    Ok(())
}

/// Replays an immutable segment record-by-record. Any decode failure is
/// fatal here.
fn replay_immutable(dir: &Path, name: &str, keydir: &KeyDir) -> Result<()> {
    let scanner = SegmentScanner::open(&dir.join(name))?;
    for frame in scanner {
        let frame = frame.map_err(|e| StoreError::from_scan(name, e))?;
        apply(keydir, name, frame);
    }
    Ok(())
}

/// Replays the active segment, tolerating an unusable tail by truncating the
/// file to the last good frame boundary. Returns the resulting length.
fn replay_active(dir: &Path, keydir: &KeyDir) -> Result<u64> {
    let path = dir.join(ACTIVE);
    if !path.exists() {
        // fresh store; open() creates the file via its append handle
        return Ok(0);
    }

    let mut good_end = 0u64;
    let mut bad_tail: Option<String> = None;

    for frame in SegmentScanner::open(&path)? {
        match frame {
            Ok(frame) => {
                good_end = frame.end;
                apply(keydir, ACTIVE, frame);
            }
            Err(ScanError::Io(e)) => return Err(e.into()),
            Err(tail) => {
                bad_tail = Some(tail.to_string());
                break;
            }
        }
    }

    if let Some(why) = bad_tail {
        tracing::warn!(
            "discarding unusable tail of {} at offset {}: {}",
            ACTIVE,
            good_end,
            why
        );
        let file = OpenOptions::new().write(true).open(&path)?;
        file.set_len(good_end)?;
        file.sync_all()?;
    }

    Ok(good_end)
}

/// Applies one replayed frame to the keydir: puts insert or overwrite,
/// tombstones remove.
fn apply(keydir: &KeyDir, segment_name: &str, frame: Frame) {
    let value_offset = frame.value_offset();
    match frame.record {
        Record::Put { key, value } => {
            if let Some(value_offset) = value_offset {
                keydir.insert(
                    key,
                    Locator {
                        segment: segment_name.to_string(),
                        value_offset,
                        value_len: value.len() as u32,
                    },
                );
            }
        }
        Record::Tombstone { key } => {
            keydir.remove(&key);
        }
    }
}
