//! Error types for loading and querying logs.
//!
//! - `LoadError` - fatal problems with the file as a whole
//! - `QueryError` - problems with one read call against a loaded log

use std::fmt;

/// Fatal load errors. When one of these is returned no partial log exists.
#[derive(Debug)]
pub enum LoadError {
    /// Reading the file failed.
    Io(std::io::Error),
    /// The input is larger than the configured size guard.
    TooLarge { size: u64, limit: u64 },
    /// The buffer is shorter than the fixed file header.
    TruncatedHeader { len: usize },
    /// The buffer does not start with the ULog magic bytes.
    BadMagic { found: Vec<u8> },
    /// The format-version byte is not one we know how to read.
    UnsupportedVersion(u8),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {e}"),
            LoadError::TooLarge { size, limit } => {
                write!(f, "log is {size} bytes, larger than the {limit} byte limit")
            }
            LoadError::TruncatedHeader { len } => {
                write!(f, "log is only {len} bytes, too short for the file header")
            }
            LoadError::BadMagic { found } => {
                write!(f, "not a ULog file: bad magic bytes {found:02x?}")
            }
            LoadError::UnsupportedVersion(v) => write!(f, "unsupported ULog version {v}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

/// Per-query errors. These are returned to the caller of a read and never
/// stored on the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No schema with this name was ever defined.
    UnknownType(String),
    /// The offset or size goes through a composite type that never arrived.
    UnresolvedType { type_name: String, missing: String },
    /// A field is absent at some depth, or an index is out of bounds.
    PathNotFound { type_name: String, path: String },
    /// The path string itself is malformed.
    InvalidPath { path: String, reason: String },
    /// The requested value kind does not match the resolved leaf.
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },
    /// The sample index is past the end of the series.
    SampleIndex { index: usize, len: usize },
    /// A decode would read past the end of a buffer.
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnknownType(name) => write!(f, "unknown type '{name}'"),
            QueryError::UnresolvedType { type_name, missing } => {
                write!(f, "{type_name}: nested type '{missing}' was never defined")
            }
            QueryError::PathNotFound { type_name, path } => {
                write!(f, "{type_name}: path '{path}' not found")
            }
            QueryError::InvalidPath { path, reason } => {
                write!(f, "invalid path '{path}': {reason}")
            }
            QueryError::TypeMismatch {
                path,
                expected,
                found,
            } => write!(f, "{path}: expected {expected}, field is {found}"),
            QueryError::SampleIndex { index, len } => {
                write!(f, "sample index {index} out of range for {len} samples")
            }
            QueryError::OutOfBounds { offset, width, len } => write!(
                f,
                "read of {width} bytes at offset {offset} overruns a {len} byte buffer"
            ),
        }
    }
}

impl std::error::Error for QueryError {}
