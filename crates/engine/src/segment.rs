//! Segment file naming and directory bookkeeping.
//!
//! Segment roles are encoded entirely in file names:
//!
//! * `active.log` — the one writable segment.
//! * `data_<ms>.log` — an immutable segment produced by rotation.
//! * `merged_<ms>.log` — an immutable segment produced by compaction.
//! * `<name>.hint` — index sidecar for segment `<name>.log` (never for the
//!   active segment).
//!
//! `<ms>` is the wall-clock millisecond of creation, zero-padded to 13 digits
//! so that names with the same prefix sort chronologically without depending
//! on digit count. Two names allocated in the same millisecond get a
//! `_<nnn>` counter suffix. Chronological order *across* the `data_`/`merged_`
//! prefixes is defined by the embedded `(ms, counter)` pair (see
//! [`order_key`]), and that is the order recovery and compaction use: a
//! rotation that happens after a merge must replay after the merged segment
//! even though `data_` sorts before `merged_` lexicographically.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// File name of the active segment.
pub(crate) const ACTIVE: &str = "active.log";

/// Extension shared by every segment file.
pub(crate) const LOG_SUFFIX: &str = ".log";

const DATA_PREFIX: &str = "data_";
const MERGED_PREFIX: &str = "merged_";

/// Hint sidecar name for segment `name` (`X.log` → `X.hint`).
pub(crate) fn hint_file_name(name: &str) -> String {
    match name.strip_suffix(LOG_SUFFIX) {
        Some(stem) => format!("{}.hint", stem),
        None => format!("{}.hint", name),
    }
}

/// Chronological ordering key embedded in a segment name: the creation
/// millisecond and the same-millisecond counter. Unparsable names order
/// first.
pub(crate) fn order_key(name: &str) -> (u64, u32) {
    let stem = name.strip_suffix(LOG_SUFFIX).unwrap_or(name);
    let rest = stem
        .strip_prefix(DATA_PREFIX)
        .or_else(|| stem.strip_prefix(MERGED_PREFIX))
        .unwrap_or("");
    let mut parts = rest.splitn(2, '_');
    let ms = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let counter = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (ms, counter)
}

/// Every immutable (non-active) segment in `dir`, oldest first.
pub(crate) fn immutable_segments(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(LOG_SUFFIX) && name != ACTIVE {
                names.push(name.to_string());
            }
        }
    }
    names.sort_by(|a, b| order_key(a).cmp(&order_key(b)).then_with(|| a.cmp(b)));
    Ok(names)
}

/// Removes leftover `.tmp` files from an interrupted merge.
pub(crate) fn cleanup_stale_tmp(dir: &Path) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".tmp") {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
    }
}

/// Allocates segment names that are unique and chronologically ordered even
/// when several are issued within one millisecond.
pub(crate) struct SegmentNamer {
    last_ms: u64,
    last_counter: u32,
}

impl SegmentNamer {
    /// A namer that will never re-issue a `(ms, counter)` pair already used
    /// by a segment in `dir`.
    pub(crate) fn seeded(dir: &Path) -> io::Result<Self> {
        let mut last = (0u64, 0u32);
        for name in immutable_segments(dir)? {
            last = last.max(order_key(&name));
        }
        Ok(Self {
            last_ms: last.0,
            last_counter: last.1,
        })
    }

    /// Name for a segment produced by rotation.
    pub(crate) fn rotated_name(&mut self) -> String {
        Self::render(DATA_PREFIX, self.next())
    }

    /// Name for a segment produced by compaction.
    pub(crate) fn merged_name(&mut self) -> String {
        Self::render(MERGED_PREFIX, self.next())
    }

    fn next(&mut self) -> (u64, u32) {
        let now = now_ms();
        if now > self.last_ms {
            self.last_ms = now;
            self.last_counter = 0;
        } else {
            // same millisecond (or a clock that went backwards): disambiguate
            self.last_counter += 1;
        }
        (self.last_ms, self.last_counter)
    }

    fn render(prefix: &str, (ms, counter): (u64, u32)) -> String {
        if counter == 0 {
            format!("{}{:013}{}", prefix, ms, LOG_SUFFIX)
        } else {
            format!("{}{:013}_{:03}{}", prefix, ms, counter, LOG_SUFFIX)
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
