//! Metadata records: info, parameters, log lines, dropouts, flag bits.
//!
//! These carry no sample data but describe the flight: firmware version,
//! parameter values, console messages, lost data.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::codec::{decode, decode_array, decode_text, trim_text, DecodedValue, PrimitiveKind};
use super::error::QueryError;
use super::frame::{ByteCursor, RecordKind};
use super::schema::{DefinitionError, Property};

/// Why a metadata payload could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageError {
    /// The payload is shorter than its fixed fields.
    Truncated(RecordKind),
    /// The key is not `<type> <name>`.
    BadKey(String),
    BadType(DefinitionError),
    InvalidUtf8,
    UnknownLogLevel(u8),
    Decode(QueryError),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::Truncated(kind) => write!(f, "truncated '{kind}' payload"),
            MessageError::BadKey(key) => write!(f, "malformed key '{key}'"),
            MessageError::BadType(e) => write!(f, "{e}"),
            MessageError::InvalidUtf8 => write!(f, "key is not valid UTF-8"),
            MessageError::UnknownLogLevel(level) => write!(f, "unknown log level 0x{level:02x}"),
            MessageError::Decode(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MessageError {}

impl From<QueryError> for MessageError {
    fn from(e: QueryError) -> Self {
        MessageError::Decode(e)
    }
}

/// A decoded info or parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Scalar(DecodedValue),
    Text(String),
    Array(Vec<DecodedValue>),
    /// Composite-typed values are kept as bytes.
    Raw(Vec<u8>),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Scalar(v) => write!(f, "{v}"),
            MetadataValue::Text(s) => write!(f, "{s}"),
            MetadataValue::Array(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            MetadataValue::Raw(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// The `I`/`P` payload: a typed key and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub name: String,
    pub type_label: String,
    pub value: MetadataValue,
}

impl KeyValue {
    /// Layout: `key_len: u8`, key `"<type> <name>"`, value bytes.
    pub fn parse(kind: RecordKind, payload: &[u8]) -> Result<Self, MessageError> {
        let mut cursor = ByteCursor::new(payload);
        let key_len = cursor.read_u8().ok_or(MessageError::Truncated(kind))?;
        let key = cursor
            .take(usize::from(key_len))
            .ok_or(MessageError::Truncated(kind))?;
        let key = std::str::from_utf8(key).map_err(|_| MessageError::InvalidUtf8)?;
        let value = cursor.rest();

        let (type_token, name) = key
            .trim()
            .split_once(' ')
            .ok_or_else(|| MessageError::BadKey(key.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(MessageError::BadKey(key.to_string()));
        }
        let property = Property::parse(type_token).map_err(MessageError::BadType)?;

        let value = match property {
            Property::Builtin(kind) => MetadataValue::Scalar(decode(kind, value, 0)?),
            Property::BuiltinArray(PrimitiveKind::Char, len) => {
                let text = decode_text(value, 0, len)?;
                MetadataValue::Text(trim_text(&text).to_string())
            }
            Property::BuiltinArray(kind, count) => {
                MetadataValue::Array(decode_array(kind, value, 0, count)?)
            }
            Property::Composite(_) | Property::CompositeArray(..) => {
                MetadataValue::Raw(value.to_vec())
            }
        };

        Ok(Self {
            name: name.to_string(),
            type_label: type_token.to_string(),
            value,
        })
    }
}

/// Syslog-style severity of a logged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    /// Levels are written as the ASCII digits `'0'` to `'7'`.
    pub fn from_byte(b: u8) -> Option<Self> {
        let level = match b {
            b'0' => LogLevel::Emergency,
            b'1' => LogLevel::Alert,
            b'2' => LogLevel::Critical,
            b'3' => LogLevel::Error,
            b'4' => LogLevel::Warning,
            b'5' => LogLevel::Notice,
            b'6' => LogLevel::Info,
            b'7' => LogLevel::Debug,
            _ => return None,
        };
        Some(level)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Emergency => "EMERGENCY",
            LogLevel::Alert => "ALERT",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A console message logged by the flight controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub timestamp_us: u64,
    pub message: String,
}

impl LogLine {
    pub fn parse(payload: &[u8]) -> Result<Self, MessageError> {
        let mut cursor = ByteCursor::new(payload);
        let truncated = MessageError::Truncated(RecordKind::Logging);
        let raw_level = cursor.read_u8().ok_or(truncated.clone())?;
        let level = LogLevel::from_byte(raw_level).ok_or(MessageError::UnknownLogLevel(raw_level))?;
        let timestamp_us = cursor.read_u64_le().ok_or(truncated)?;
        let message = String::from_utf8_lossy(cursor.rest())
            .trim_end_matches('\0')
            .to_string();
        Ok(Self {
            level,
            timestamp_us,
            message,
        })
    }
}

/// Data the logger had to throw away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dropout {
    pub duration_ms: u16,
}

/// Compatibility flags from the `B` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlagBits {
    pub compat: [u8; 8],
    pub incompat: [u8; 8],
    pub appended_offsets: [u64; 3],
}

impl FlagBits {
    const DATA_APPENDED: u8 = 0x01;

    pub fn parse(payload: &[u8]) -> Result<Self, MessageError> {
        let mut cursor = ByteCursor::new(payload);
        let truncated = || MessageError::Truncated(RecordKind::FlagBits);
        let compat = cursor.read_array::<8>().ok_or_else(truncated)?;
        let incompat = cursor.read_array::<8>().ok_or_else(truncated)?;
        let mut appended_offsets = [0u64; 3];
        for slot in &mut appended_offsets {
            *slot = cursor.read_u64_le().ok_or_else(truncated)?;
        }
        Ok(Self {
            compat,
            incompat,
            appended_offsets,
        })
    }

    pub fn has_appended_data(&self) -> bool {
        self.incompat[0] & Self::DATA_APPENDED != 0
    }

    /// Incompatible flags this reader does not understand.
    pub fn has_unknown_incompat(&self) -> bool {
        self.incompat[0] & !Self::DATA_APPENDED != 0 || self.incompat[1..].iter().any(|&b| b != 0)
    }
}

/// Everything in a log that is not a sample.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogMetadata {
    pub info: BTreeMap<String, MetadataValue>,
    /// Multi-part info values. A new group starts whenever a record is not
    /// flagged as a continuation.
    pub info_multi: BTreeMap<String, Vec<Vec<MetadataValue>>>,
    pub parameters: BTreeMap<String, MetadataValue>,
    pub log_lines: Vec<LogLine>,
    pub dropouts: Vec<Dropout>,
    pub sync_count: usize,
    pub flag_bits: Option<FlagBits>,
}

impl LogMetadata {
    /// Decode one metadata frame into `self`. Frames of kinds that carry
    /// samples or schemas are ignored here.
    pub fn apply(&mut self, kind: RecordKind, payload: &[u8]) -> Result<(), MessageError> {
        match kind {
            RecordKind::Info => {
                let kv = KeyValue::parse(kind, payload)?;
                self.info.insert(kv.name, kv.value);
            }
            RecordKind::InfoMultiple => {
                let (&is_continued, rest) = payload
                    .split_first()
                    .ok_or(MessageError::Truncated(kind))?;
                let kv = KeyValue::parse(kind, rest)?;
                let groups = self.info_multi.entry(kv.name).or_default();
                match groups.last_mut() {
                    Some(group) if is_continued != 0 => group.push(kv.value),
                    _ => groups.push(vec![kv.value]),
                }
            }
            RecordKind::Parameter => {
                let kv = KeyValue::parse(kind, payload)?;
                self.parameters.insert(kv.name, kv.value);
            }
            RecordKind::Logging => self.log_lines.push(LogLine::parse(payload)?),
            RecordKind::Dropout => {
                let duration_ms = ByteCursor::new(payload)
                    .read_u16_le()
                    .ok_or(MessageError::Truncated(kind))?;
                self.dropouts.push(Dropout { duration_ms });
            }
            RecordKind::Sync => self.sync_count += 1,
            RecordKind::FlagBits => self.flag_bits = Some(FlagBits::parse(payload)?),
            RecordKind::Format
            | RecordKind::Data
            | RecordKind::AddLogged
            | RecordKind::RemoveLogged => {}
        }
        Ok(())
    }

    /// Total time lost to dropouts.
    pub fn dropout_ms(&self) -> u64 {
        self.dropouts.iter().map(|d| u64::from(d.duration_ms)).sum()
    }

    /// An info value as trimmed text, if it is text.
    pub fn info_text(&self, name: &str) -> Option<&str> {
        match self.info.get(name)? {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}
