//! Compaction: `merge()` rewrites every immutable segment into one.
//!
//! A merged segment keeps exactly the records the keydir still points at —
//! the currently live version of each key — and drops everything else:
//! overwritten puts and all tombstones (their masking job ends when the older
//! puts they mask are discarded along with the input segments). The merged
//! segment gets a hint sidecar so the next open can re-index it without a
//! rescan.
//!
//! The output is written to a `.tmp` file, fsync'd, and renamed into place,
//! so a crash can never leave a partial `merged_*.log` visible. Inputs are
//! deleted only after the new locators are installed in the keydir; a reader
//! holding an old locator finds its input file still present until that
//! point, and one holding a new locator finds the merged file already
//! durable.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use keydir::Locator;
use record::{Record, SegmentScanner};

use crate::error::{Result, StoreError};
use crate::segment;
use crate::Store;

impl Store {
    /// Compacts all immutable segments into a single merged segment plus its
    /// hint file, then deletes the inputs.
    ///
    /// Holds the write mutex for the full duration, so no append or rotation
    /// interleaves. Reads proceed concurrently throughout. A no-op when there
    /// are no immutable segments; the active segment is never compacted.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptSegment`] if an input fails to decode, or
    /// [`StoreError::Io`] on filesystem failure. Either way the partial
    /// merged file is discarded and the store is unchanged.
    pub fn merge(&self) -> Result<()> {
        let mut state = self.writer.lock();

        let inputs = segment::immutable_segments(&self.dir)?;
        if inputs.is_empty() {
            tracing::debug!("no immutable segments to merge");
            return Ok(());
        }

        let merged_name = state.namer.merged_name();
        let tmp_path = self.dir.join(format!("{}.tmp", merged_name));

        let rebuilt = match self.write_merged(&inputs, &tmp_path, &merged_name) {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        fs::rename(&tmp_path, self.dir.join(&merged_name))?;

        write_hint(&self.dir, &merged_name, &rebuilt)?;

        // Install the new locators. Keys whose live version sits in the
        // active segment are not in `rebuilt` and keep their entries.
        let retained = rebuilt.len();
        for (key, locator) in rebuilt {
            self.keydir.insert(key, locator);
        }

        // Inputs (and their hints) are garbage now. Readers can no longer
        // reach them through the keydir; delete failures just leak a file.
        for name in &inputs {
            if let Err(e) = fs::remove_file(self.dir.join(name)) {
                tracing::warn!("failed to delete merged input {}: {}", name, e);
            }
            let hint = self.dir.join(segment::hint_file_name(name));
            if hint.exists() {
                if let Err(e) = fs::remove_file(&hint) {
                    tracing::warn!("failed to delete hint of merged input {}: {}", name, e);
                }
            }
        }

        tracing::info!(
            "merged {} segments into {} ({} live records)",
            inputs.len(),
            merged_name,
            retained
        );
        Ok(())
    }

    /// Streams every live record from `inputs` into the temp file, returning
    /// the locators of the copies keyed for the keydir install.
    fn write_merged(
        &self,
        inputs: &[String],
        tmp_path: &Path,
        merged_name: &str,
    ) -> Result<BTreeMap<Vec<u8>, Locator>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut out = BufWriter::new(file);

        let mut rebuilt = BTreeMap::new();
        let mut offset = 0u64;
        let mut buf = Vec::with_capacity(256);

        for name in inputs {
            let scanner = SegmentScanner::open(&self.dir.join(name))?;
            for frame in scanner {
                let frame = frame.map_err(|e| StoreError::from_scan(name, e))?;
                let value_offset = frame.value_offset();
                let (key, value) = match frame.record {
                    Record::Put { key, value } => (key, value),
                    // tombstones only mask records in the inputs, which are
                    // all going away
                    Record::Tombstone { .. } => continue,
                };

                // Retain iff this exact record is the live version: same
                // segment, same value offset, same length.
                let live = match self.keydir.get(&key) {
                    Some(current) => {
                        current.segment == *name
                            && Some(current.value_offset) == value_offset
                            && current.value_len == value.len() as u32
                    }
                    None => false,
                };
                if !live {
                    continue;
                }

                buf.clear();
                record::encode_put(&mut buf, &key, &value);
                out.write_all(&buf)?;

                let new_value_offset = offset + record::value_offset_in_frame(key.len());
                let value_len = value.len() as u32;
                offset += buf.len() as u64;
                rebuilt.insert(
                    key,
                    Locator {
                        segment: merged_name.to_string(),
                        value_offset: new_value_offset,
                        value_len,
                    },
                );
            }
        }

        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(rebuilt)
    }
}

/// Writes the hint sidecar for a merged segment, through the same temp-file +
/// fsync + rename discipline as the segment itself.
fn write_hint(dir: &Path, merged_name: &str, rebuilt: &BTreeMap<Vec<u8>, Locator>) -> Result<()> {
    let hint_name = segment::hint_file_name(merged_name);
    let tmp_path = dir.join(format!("{}.tmp", hint_name));

    let mut buf = Vec::new();
    for (key, locator) in rebuilt {
        record::append_hint_entry(&mut buf, key, locator.value_offset, locator.value_len);
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    fs::rename(&tmp_path, dir.join(&hint_name))?;
    Ok(())
}
