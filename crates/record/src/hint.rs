//! Hint-file codec.
//!
//! A hint file is a sidecar for one segment: a flat sequence of
//! `[key_len: u32 BE][key][value_offset: u64 BE][value_len: u32 BE]` entries,
//! one per live put in the segment, in no particular order. There is no
//! framing prefix; EOF terminates the sequence. Recovery bulk-loads a hint
//! instead of rescanning the segment it belongs to.

use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::read_fully;

/// One hint entry: where a live value sits inside the segment the hint is
/// bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintEntry {
    /// The key the value belongs to.
    pub key: Vec<u8>,
    /// Absolute offset of the value payload inside the segment.
    pub value_offset: u64,
    /// Length of the value payload.
    pub value_len: u32,
}

/// Appends an encoded hint entry to `buf`.
pub fn append_hint_entry(buf: &mut Vec<u8>, key: &[u8], value_offset: u64, value_len: u32) {
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&value_offset.to_be_bytes());
    buf.extend_from_slice(&value_len.to_be_bytes());
}

/// Sequential reader over the entries of one hint file.
///
/// A partial trailing entry is treated as end-of-file: hints are rebuilt
/// wholesale by every merge, so whole entries are the only unit worth
/// trusting.
pub struct HintScanner<R: Read> {
    rdr: BufReader<R>,
    done: bool,
}

impl HintScanner<File> {
    /// Opens a hint file for sequential reading.
    pub fn open(path: &Path) -> io::Result<HintScanner<File>> {
        Ok(HintScanner::from_reader(File::open(path)?))
    }
}

impl<R: Read> HintScanner<R> {
    /// Constructs a scanner from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        HintScanner {
            rdr: BufReader::new(reader),
            done: false,
        }
    }

    fn next_entry(&mut self) -> io::Result<Option<HintEntry>> {
        let mut key_len = [0u8; 4];
        match read_fully(&mut self.rdr, &mut key_len)? {
            4 => {}
            _ => return Ok(None),
        }

        let mut key = vec![0u8; u32::from_be_bytes(key_len) as usize];
        if read_fully(&mut self.rdr, &mut key)? != key.len() {
            return Ok(None);
        }

        let mut tail = [0u8; 12];
        if read_fully(&mut self.rdr, &mut tail)? != tail.len() {
            return Ok(None);
        }
        let mut tail = &tail[..];
        let value_offset = tail.read_u64::<BigEndian>()?;
        let value_len = tail.read_u32::<BigEndian>()?;

        Ok(Some(HintEntry {
            key,
            value_offset,
            value_len,
        }))
    }
}

impl<R: Read> Iterator for HintScanner<R> {
    type Item = io::Result<HintEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
