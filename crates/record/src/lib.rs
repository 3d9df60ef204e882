//! # Record — on-disk record and hint codecs
//!
//! Defines the byte layout shared by every segment file in a CinderKV data
//! directory, and the sidecar hint format used to re-index merged segments
//! without rescanning them.
//!
//! ## Binary Record Format
//!
//! ```text
//! [record_len: u32 BE][body ...]
//! ```
//!
//! Body (Put):       `[type=1: u8][key_len: u32][key][value_len: u32][value]`
//! Body (Tombstone): `[type=2: u8][key_len: u32][key]`
//!
//! `record_len` counts every byte after itself, so a frame occupies exactly
//! `4 + record_len` bytes and the next frame starts right behind it. All
//! integers are big-endian; keys and values are opaque bytes.
//!
//! The value payload of a Put begins at `frame_start + 4 + 1 + 4 + key_len + 4`
//! — that offset is what the in-memory index stores, so a reader can fetch a
//! value with a single seek + read without re-parsing the frame.
//!
//! ## Example
//!
//! ```rust,no_run
//! use record::{encode_put, Record, SegmentScanner};
//!
//! let mut buf = Vec::new();
//! encode_put(&mut buf, b"hello", b"world");
//! std::fs::write("seg.log", &buf).unwrap();
//!
//! for frame in SegmentScanner::open("seg.log".as_ref()).unwrap() {
//!     println!("{:?}", frame.unwrap().record);
//! }
//! ```

use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use thiserror::Error;

mod hint;

pub use hint::{append_hint_entry, HintEntry, HintScanner};

/// Record type tag for a key-value insertion.
pub const TYPE_PUT: u8 = 1;
/// Record type tag for a deletion marker.
pub const TYPE_TOMBSTONE: u8 = 2;

/// Size of the `record_len` prefix in front of every frame.
pub const LEN_PREFIX_BYTES: u64 = 4;

/// Smallest legal `record_len`: a tombstone for a one-byte key.
const MIN_RECORD_LEN: u32 = 1 + 4 + 1;
/// Largest legal `record_len` (lengths are capped at `i32::MAX` on the wire).
const MAX_RECORD_LEN: u32 = i32::MAX as u32;

/// A single decoded record: either a key-value insertion or a deletion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A key-value insertion.
    Put {
        /// The lookup key.
        key: Vec<u8>,
        /// The payload value.
        value: Vec<u8>,
    },
    /// A deletion marker. Its only job is to mask older Puts for the same key
    /// during replay; compaction erases both.
    Tombstone {
        /// The deleted key.
        key: Vec<u8>,
    },
}

impl Record {
    /// The key this record is about.
    pub fn key(&self) -> &[u8] {
        match self {
            Record::Put { key, .. } | Record::Tombstone { key } => key,
        }
    }
}

/// Errors produced while scanning a segment.
///
/// A scanner stops yielding frames after the first error; whether the error
/// is fatal depends on the caller (a truncated tail is benign in the active
/// segment, corruption in an immutable one).
#[derive(Debug, Error)]
pub enum ScanError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The frame header was complete but the body ended early, e.g. from a
    /// crash mid-append.
    #[error("truncated record at offset {offset}")]
    TruncatedTail {
        /// Offset of the start of the incomplete frame.
        offset: u64,
    },

    /// The record type tag was neither a put nor a tombstone.
    #[error("unknown record type {tag} at offset {offset}")]
    UnknownRecordType {
        /// Offset of the start of the offending frame.
        offset: u64,
        /// The unrecognized tag byte.
        tag: u8,
    },

    /// The length fields inside the frame do not add up.
    #[error("malformed frame at offset {offset}: {reason}")]
    MalformedFrame {
        /// Offset of the start of the offending frame.
        offset: u64,
        /// What failed to line up.
        reason: &'static str,
    },
}

impl ScanError {
    /// Offset of the frame that triggered the error, when known. This is
    /// always a frame boundary, so it doubles as the last safe append
    /// position in the file.
    pub fn offset(&self) -> Option<u64> {
        match self {
            ScanError::Io(_) => None,
            ScanError::TruncatedTail { offset }
            | ScanError::UnknownRecordType { offset, .. }
            | ScanError::MalformedFrame { offset, .. } => Some(*offset),
        }
    }
}

/// Total frame size of a put record, length prefix included.
pub fn put_frame_len(key_len: usize, value_len: usize) -> u64 {
    4 + 1 + 4 + key_len as u64 + 4 + value_len as u64
}

/// Total frame size of a tombstone record, length prefix included.
pub fn tombstone_frame_len(key_len: usize) -> u64 {
    4 + 1 + 4 + key_len as u64
}

/// Offset of the value payload relative to the start of a put frame.
pub fn value_offset_in_frame(key_len: usize) -> u64 {
    4 + 1 + 4 + key_len as u64 + 4
}

/// Appends an encoded put frame to `buf`.
///
/// The buffer is not cleared first, so callers can reuse one scratch buffer
/// across appends (clear between frames) or batch several frames into it.
pub fn encode_put(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    let record_len = 1 + 4 + key.len() + 4 + value.len();
    buf.reserve(4 + record_len);
    buf.extend_from_slice(&(record_len as u32).to_be_bytes());
    buf.push(TYPE_PUT);
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buf.extend_from_slice(value);
}

/// Appends an encoded tombstone frame to `buf`.
pub fn encode_tombstone(buf: &mut Vec<u8>, key: &[u8]) {
    let record_len = 1 + 4 + key.len();
    buf.reserve(4 + record_len);
    buf.extend_from_slice(&(record_len as u32).to_be_bytes());
    buf.push(TYPE_TOMBSTONE);
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(key);
}

/// One decoded frame together with its position in the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the frame's length prefix.
    pub start: u64,
    /// Offset one past the frame, i.e. where the next frame starts.
    pub end: u64,
    /// The decoded record.
    pub record: Record,
}

impl Frame {
    /// Absolute offset of the value payload inside the segment.
    ///
    /// `None` for tombstones, which carry no value.
    pub fn value_offset(&self) -> Option<u64> {
        match &self.record {
            Record::Put { key, .. } => Some(self.start + value_offset_in_frame(key.len())),
            Record::Tombstone { .. } => None,
        }
    }

    /// Length of the value payload. `None` for tombstones.
    pub fn value_len(&self) -> Option<u32> {
        match &self.record {
            Record::Put { value, .. } => Some(value.len() as u32),
            Record::Tombstone { .. } => None,
        }
    }
}

/// Sequential scanner over the frames of one segment.
///
/// Yields each frame with its byte range, stopping cleanly at EOF. The first
/// decode error ends the scan: later bytes cannot be trusted once framing is
/// lost, so the scanner fuses itself after yielding the error.
///
/// The scanner is generic over any `Read` implementor so tests can replay
/// in-memory buffers (e.g. `Cursor<Vec<u8>>`).
pub struct SegmentScanner<R: Read> {
    rdr: BufReader<R>,
    pos: u64,
    /// Reusable body buffer to avoid an allocation per frame.
    buf: Vec<u8>,
    done: bool,
}

impl SegmentScanner<File> {
    /// Opens a segment file for a sequential scan from the beginning.
    pub fn open(path: &Path) -> io::Result<SegmentScanner<File>> {
        Ok(SegmentScanner::from_reader(File::open(path)?))
    }
}

impl<R: Read> SegmentScanner<R> {
    /// Constructs a scanner from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        SegmentScanner {
            rdr: BufReader::new(reader),
            pos: 0,
            buf: Vec::with_capacity(256),
            done: false,
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        let start = self.pos;

        // Length prefix. Zero bytes here is a clean EOF; a short read is a
        // torn frame header.
        let mut prefix = [0u8; 4];
        match read_fully(&mut self.rdr, &mut prefix)? {
            0 => return Ok(None),
            4 => {}
            _ => return Err(ScanError::TruncatedTail { offset: start }),
        }

        let record_len = u32::from_be_bytes(prefix);
        if !(MIN_RECORD_LEN..=MAX_RECORD_LEN).contains(&record_len) {
            return Err(ScanError::MalformedFrame {
                offset: start,
                reason: "record length out of range",
            });
        }

        self.buf.clear();
        self.buf.resize(record_len as usize, 0);
        if read_fully(&mut self.rdr, &mut self.buf)? != record_len as usize {
            return Err(ScanError::TruncatedTail { offset: start });
        }

        let tag = self.buf[0];
        let mut body = &self.buf[1..];
        let record = match tag {
            TYPE_PUT => {
                let key = read_chunk(&mut body).ok_or(ScanError::MalformedFrame {
                    offset: start,
                    reason: "key extends past record",
                })?;
                let value = read_chunk(&mut body).ok_or(ScanError::MalformedFrame {
                    offset: start,
                    reason: "value extends past record",
                })?;
                if !body.is_empty() {
                    return Err(ScanError::MalformedFrame {
                        offset: start,
                        reason: "trailing bytes after value",
                    });
                }
                Record::Put { key, value }
            }
            TYPE_TOMBSTONE => {
                let key = read_chunk(&mut body).ok_or(ScanError::MalformedFrame {
                    offset: start,
                    reason: "key extends past record",
                })?;
                if !body.is_empty() {
                    return Err(ScanError::MalformedFrame {
                        offset: start,
                        reason: "trailing bytes after key",
                    });
                }
                Record::Tombstone { key }
            }
            tag => return Err(ScanError::UnknownRecordType { offset: start, tag }),
        };

        self.pos = start + LEN_PREFIX_BYTES + record_len as u64;
        Ok(Some(Frame {
            start,
            end: self.pos,
            record,
        }))
    }
}

impl<R: Read> Iterator for SegmentScanner<R> {
    type Item = Result<Frame, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
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

/// Reads a `[u32 len][len bytes]` chunk from the front of `body`, advancing it.
fn read_chunk(body: &mut &[u8]) -> Option<Vec<u8>> {
    let len = body.read_u32::<BigEndian>().ok()? as usize;
    if body.len() < len {
        return None;
    }
    let chunk = body[..len].to_vec();
    *body = &body[len..];
    Some(chunk)
}

/// Reads until `buf` is full or EOF, returning how many bytes landed.
///
/// Unlike `read_exact` this distinguishes "nothing left" from "some bytes
/// then EOF", which is the difference between a clean end of segment and a
/// truncated tail.
pub(crate) fn read_fully<R: Read>(rdr: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match rdr.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
