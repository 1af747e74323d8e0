//! File header validation and frame extraction.
//!
//! A ULog file is a 16 byte header followed by a stream of frames. Each
//! frame is a 3 byte header (payload length as `u16` LE, then a one byte
//! ASCII tag) and `length` bytes of payload. This layout is a bit-for-bit
//! contract with the logger.

use std::fmt;

use serde::Serialize;

use super::error::LoadError;

/// `"ULog"` followed by `0x01 0x12 0x35`.
pub const MAGIC: [u8; 7] = [0x55, 0x4c, 0x6f, 0x67, 0x01, 0x12, 0x35];
pub const FILE_HEADER_LEN: usize = 16;
pub const FRAME_HEADER_LEN: usize = 3;
pub const SUPPORTED_VERSIONS: [u8; 2] = [0, 1];

/// Bounds-checked forward cursor over a byte slice.
///
/// Every read checks the remaining length first and returns `None` when the
/// bytes are not there, so garbage input can never cause a panic.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.remaining() {
            return None;
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Some(out)
    }

    /// Take everything that is left.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Some(out)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Read a frame header: payload length and kind tag.
    pub fn read_header(&mut self) -> Option<(u16, u8)> {
        let raw: [u8; FRAME_HEADER_LEN] = self.read_array()?;
        Some((u16::from_le_bytes([raw[0], raw[1]]), raw[2]))
    }

    /// Slice a payload whose length has already been checked against
    /// [`remaining`](Self::remaining).
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the remaining bytes. That is a bug in the
    /// caller, not bad input.
    pub fn read_payload(&mut self, len: usize) -> &'a [u8] {
        assert!(
            len <= self.remaining(),
            "payload length {len} not validated against {} remaining bytes",
            self.remaining()
        );
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        out
    }
}

/// The fixed header at the start of every log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    pub version: u8,
    /// Logger start time in microseconds.
    pub start_timestamp_us: u64,
}

impl FileHeader {
    /// Validate and parse the file header. Any problem here is fatal.
    pub fn parse(buf: &[u8]) -> Result<Self, LoadError> {
        let mut cursor = ByteCursor::new(buf);
        let (magic, version, start_timestamp_us) = match (
            cursor.read_array::<7>(),
            cursor.read_u8(),
            cursor.read_u64_le(),
        ) {
            (Some(m), Some(v), Some(ts)) => (m, v, ts),
            _ => {
                // Prefer the magic error when even the first bytes are wrong.
                let prefix = &buf[..buf.len().min(MAGIC.len())];
                if prefix != &MAGIC[..prefix.len()] {
                    return Err(LoadError::BadMagic {
                        found: prefix.to_vec(),
                    });
                }
                return Err(LoadError::TruncatedHeader { len: buf.len() });
            }
        };

        if magic != MAGIC {
            return Err(LoadError::BadMagic {
                found: magic.to_vec(),
            });
        }
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(LoadError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            start_timestamp_us,
        })
    }
}

/// What a frame carries, identified by its one character tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordKind {
    Format,
    Data,
    Info,
    InfoMultiple,
    Parameter,
    AddLogged,
    RemoveLogged,
    Sync,
    Dropout,
    Logging,
    FlagBits,
}

impl RecordKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        let kind = match tag {
            b'F' => RecordKind::Format,
            b'D' => RecordKind::Data,
            b'I' => RecordKind::Info,
            b'M' => RecordKind::InfoMultiple,
            b'P' => RecordKind::Parameter,
            b'A' => RecordKind::AddLogged,
            b'R' => RecordKind::RemoveLogged,
            b'S' => RecordKind::Sync,
            b'O' => RecordKind::Dropout,
            b'L' => RecordKind::Logging,
            b'B' => RecordKind::FlagBits,
            _ => return None,
        };
        Some(kind)
    }

    pub const fn tag(self) -> u8 {
        match self {
            RecordKind::Format => b'F',
            RecordKind::Data => b'D',
            RecordKind::Info => b'I',
            RecordKind::InfoMultiple => b'M',
            RecordKind::Parameter => b'P',
            RecordKind::AddLogged => b'A',
            RecordKind::RemoveLogged => b'R',
            RecordKind::Sync => b'S',
            RecordKind::Dropout => b'O',
            RecordKind::Logging => b'L',
            RecordKind::FlagBits => b'B',
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag() as char)
    }
}

/// One frame, borrowed from the input buffer.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub kind: RecordKind,
    pub payload: &'a [u8],
    /// Byte offset of the frame header within the whole file.
    pub offset: usize,
}

/// Why frame reading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StreamEnd {
    /// Every byte was consumed.
    Complete,
    /// A frame header carried a tag that is not a known record kind.
    UnknownTag { offset: usize, tag: u8 },
    /// A frame header, or its payload, ran past the end of the buffer.
    Truncated {
        offset: usize,
        declared: usize,
        available: usize,
    },
}

impl StreamEnd {
    pub fn is_complete(&self) -> bool {
        matches!(self, StreamEnd::Complete)
    }
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Complete => write!(f, "complete"),
            StreamEnd::UnknownTag { offset, tag } => {
                write!(f, "unknown record tag 0x{tag:02x} at offset {offset}")
            }
            StreamEnd::Truncated {
                offset,
                declared,
                available,
            } => write!(
                f,
                "truncated frame at offset {offset}: {declared} bytes declared, {available} available"
            ),
        }
    }
}

/// Iterator over the frames that follow the file header.
///
/// Iteration ends at the end of the buffer, at a truncated frame, or at an
/// unknown tag. [`stream_end`](Self::stream_end) says which.
pub struct FrameReader<'a> {
    cursor: ByteCursor<'a>,
    base: usize,
    end: Option<StreamEnd>,
}

impl<'a> FrameReader<'a> {
    /// `frames` is the buffer after the file header; `base` is its offset in
    /// the file, used only for reporting.
    pub fn new(frames: &'a [u8], base: usize) -> Self {
        Self {
            cursor: ByteCursor::new(frames),
            base,
            end: None,
        }
    }

    /// Set once the iterator has returned `None`.
    pub fn stream_end(&self) -> Option<StreamEnd> {
        self.end
    }

    fn stop(&mut self, end: StreamEnd) -> Option<Frame<'a>> {
        self.end = Some(end);
        None
    }
}

impl<'a> Iterator for FrameReader<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end.is_some() {
            return None;
        }
        if self.cursor.is_empty() {
            return self.stop(StreamEnd::Complete);
        }

        let offset = self.base + self.cursor.position();
        let available = self.cursor.remaining();
        let Some((len, tag)) = self.cursor.read_header() else {
            return self.stop(StreamEnd::Truncated {
                offset,
                declared: FRAME_HEADER_LEN,
                available,
            });
        };

        let Some(kind) = RecordKind::from_tag(tag) else {
            return self.stop(StreamEnd::UnknownTag { offset, tag });
        };

        let len = usize::from(len);
        if len > self.cursor.remaining() {
            return self.stop(StreamEnd::Truncated {
                offset,
                declared: len,
                available: self.cursor.remaining(),
            });
        }

        let payload = self.cursor.read_payload(len);
        Some(Frame {
            kind,
            payload,
            offset,
        })
    }
}
