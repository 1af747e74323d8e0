//! Single-pass loading of a whole log into an immutable [`ParsedLog`].

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::codec::{trim_text, DecodedValue, Primitive};
use super::config::LoadConfig;
use super::error::{LoadError, QueryError};
use super::frame::{ByteCursor, FileHeader, Frame, FrameReader, RecordKind, StreamEnd, FILE_HEADER_LEN};
use super::messages::{LogMetadata, MetadataValue};
use super::path::{resolve, ResolvedPath};
use super::schema::SchemaRegistry;
use super::series::SeriesReader;
use super::store::{ChannelTable, SampleStore};

/// A frame that was skipped, or the reason parsing stopped early.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A data frame named a channel id with no current binding.
    UnregisteredChannel { offset: usize, channel_id: u16 },
    /// A format definition could not be parsed.
    InvalidDefinition { offset: usize, reason: String },
    /// Any other frame whose payload could not be decoded.
    MalformedFrame {
        offset: usize,
        record: RecordKind,
        reason: String,
    },
    /// Frame reading stopped before the end of the buffer.
    StreamStopped { end: StreamEnd },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnregisteredChannel { offset, channel_id } => {
                write!(f, "offset {offset}: data for unregistered channel {channel_id} dropped")
            }
            Diagnostic::InvalidDefinition { offset, reason } => {
                write!(f, "offset {offset}: format definition dropped: {reason}")
            }
            Diagnostic::MalformedFrame {
                offset,
                record,
                reason,
            } => write!(f, "offset {offset}: '{record}' frame dropped: {reason}"),
            Diagnostic::StreamStopped { end } => write!(f, "parsing stopped: {end}"),
        }
    }
}

/// Everything decoded from one log. Nothing changes after loading, so any
/// number of readers can share it.
#[derive(Debug)]
pub struct ParsedLog {
    header: FileHeader,
    registry: SchemaRegistry,
    channels: ChannelTable,
    samples: SampleStore,
    metadata: LogMetadata,
    diagnostics: Vec<Diagnostic>,
    suppressed_diagnostics: usize,
    max_diagnostics: usize,
    stream_end: StreamEnd,
}

/// Decode a complete log buffer with the default configuration.
pub fn load_log(buf: &[u8]) -> Result<ParsedLog, LoadError> {
    load_log_with(buf, &LoadConfig::default())
}

/// Decode a complete log buffer.
///
/// A bad file header is fatal. A truncated frame or an unknown record tag
/// ends parsing but keeps everything decoded up to that point; see
/// [`ParsedLog::stream_end`].
pub fn load_log_with(buf: &[u8], config: &LoadConfig) -> Result<ParsedLog, LoadError> {
    let size = buf.len() as u64;
    if size > config.max_log_bytes {
        return Err(LoadError::TooLarge {
            size,
            limit: config.max_log_bytes,
        });
    }

    let header = FileHeader::parse(buf)?;
    let mut log = ParsedLog {
        header,
        registry: SchemaRegistry::new(),
        channels: ChannelTable::default(),
        samples: SampleStore::default(),
        metadata: LogMetadata::default(),
        diagnostics: Vec::new(),
        suppressed_diagnostics: 0,
        max_diagnostics: config.max_diagnostics,
        stream_end: StreamEnd::Complete,
    };

    let mut frames = FrameReader::new(&buf[FILE_HEADER_LEN..], FILE_HEADER_LEN);
    for frame in frames.by_ref() {
        log.dispatch(frame);
    }

    let end = frames.stream_end().unwrap_or(StreamEnd::Complete);
    if !end.is_complete() {
        warn!("Log parsing stopped early: {end}");
        log.record(Diagnostic::StreamStopped { end });
    }
    log.stream_end = end;

    if log.metadata.flag_bits.is_some_and(|b| b.has_unknown_incompat()) {
        warn!("Log sets incompatible flag bits this reader does not understand");
    }

    info!(
        "Loaded ULog v{}: {} types, {} samples, {} diagnostics",
        log.header.version,
        log.registry.len(),
        log.samples.total(),
        log.diagnostics.len() + log.suppressed_diagnostics
    );
    Ok(log)
}

/// Read and decode a log file. Files ending in `.gz` are decompressed.
pub fn load_log_file(path: &Path, config: &LoadConfig) -> Result<ParsedLog, LoadError> {
    let buf = read_log_bytes(path, config.max_log_bytes)?;
    load_log_with(&buf, config)
}

fn read_log_bytes(path: &Path, limit: u64) -> Result<Vec<u8>, LoadError> {
    let file = File::open(path)?;
    let compressed = path.extension().is_some_and(|ext| ext == "gz");
    if !compressed {
        let size = file.metadata()?.len();
        if size > limit {
            return Err(LoadError::TooLarge { size, limit });
        }
    }

    let reader = BufReader::with_capacity(256 * 1024, file);
    let reader: Box<dyn Read> = if compressed {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut buf = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(LoadError::TooLarge {
            size: buf.len() as u64,
            limit,
        });
    }
    debug!("Read {} bytes from {}", buf.len(), path.display());
    Ok(buf)
}

impl ParsedLog {
    fn record(&mut self, diagnostic: Diagnostic) {
        debug!("{diagnostic}");
        if self.diagnostics.len() < self.max_diagnostics {
            self.diagnostics.push(diagnostic);
        } else {
            self.suppressed_diagnostics += 1;
        }
    }

    fn malformed(&mut self, frame: &Frame<'_>, reason: impl ToString) {
        self.record(Diagnostic::MalformedFrame {
            offset: frame.offset,
            record: frame.kind,
            reason: reason.to_string(),
        });
    }

    fn dispatch(&mut self, frame: Frame<'_>) {
        match frame.kind {
            RecordKind::Format => {
                let Ok(text) = std::str::from_utf8(frame.payload) else {
                    self.record(Diagnostic::InvalidDefinition {
                        offset: frame.offset,
                        reason: "definition is not valid UTF-8".to_string(),
                    });
                    return;
                };
                if let Err(e) = self.registry.define(trim_text(text)).map(|_| ()) {
                    self.record(Diagnostic::InvalidDefinition {
                        offset: frame.offset,
                        reason: e.to_string(),
                    });
                }
            }
            RecordKind::AddLogged => {
                let mut cursor = ByteCursor::new(frame.payload);
                let (Some(multi_id), Some(id)) = (cursor.read_u8(), cursor.read_u16_le()) else {
                    self.malformed(&frame, "payload too short");
                    return;
                };
                let Ok(name) = std::str::from_utf8(cursor.rest()) else {
                    self.malformed(&frame, "type name is not valid UTF-8");
                    return;
                };
                let name = trim_text(name).trim();
                if name.is_empty() {
                    self.malformed(&frame, "empty type name");
                    return;
                }
                if let Some(old) = self.channels.register(id, name, multi_id) {
                    debug!(
                        "Channel {id} rebound from {} to {name}",
                        old.type_name
                    );
                }
            }
            RecordKind::RemoveLogged => match ByteCursor::new(frame.payload).read_u16_le() {
                Some(id) => {
                    self.channels.deregister(id);
                }
                None => self.malformed(&frame, "payload too short"),
            },
            RecordKind::Data => {
                let mut cursor = ByteCursor::new(frame.payload);
                let Some(id) = cursor.read_u16_le() else {
                    self.malformed(&frame, "payload too short");
                    return;
                };
                match self.channels.lookup(id) {
                    Some(binding) => {
                        self.samples
                            .append(&binding.type_name, binding.multi_id, cursor.rest());
                    }
                    None => self.record(Diagnostic::UnregisteredChannel {
                        offset: frame.offset,
                        channel_id: id,
                    }),
                }
            }
            kind => {
                if let Err(e) = self.metadata.apply(kind, frame.payload) {
                    self.malformed(&frame, e);
                }
            }
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn start_timestamp_us(&self) -> u64 {
        self.header.start_timestamp_us
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    pub fn metadata(&self) -> &LogMetadata {
        &self.metadata
    }

    /// Per-frame problems seen while loading, up to the configured limit.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics dropped because the limit was reached.
    pub fn suppressed_diagnostics(&self) -> usize {
        self.suppressed_diagnostics
    }

    pub fn stream_end(&self) -> StreamEnd {
        self.stream_end
    }

    /// Every defined type name, sorted.
    pub fn types(&self) -> Vec<&str> {
        self.registry.names().collect()
    }

    pub fn sample_count(&self, type_name: &str) -> usize {
        self.samples.samples(type_name).len()
    }

    /// A reader over every sample of `type_name`.
    pub fn series(&self, type_name: &str) -> Result<SeriesReader<'_>, QueryError> {
        let schema = self.registry.schema(type_name)?;
        Ok(SeriesReader::new(schema, self.samples.samples(type_name)))
    }

    pub fn resolve(&self, type_name: &str, path: &str) -> Result<ResolvedPath, QueryError> {
        resolve(&self.registry, type_name, path)
    }

    /// One `T` per logged sample of `type_name`, in log order.
    pub fn read<T: Primitive>(&self, type_name: &str, path: &str) -> Result<Vec<T>, QueryError> {
        self.series(type_name)?.map_all(path, |v: T| v)
    }

    /// One array per logged sample of `type_name`, in log order.
    pub fn read_array<T: Primitive>(
        &self,
        type_name: &str,
        path: &str,
    ) -> Result<Vec<Vec<T>>, QueryError> {
        self.series(type_name)?
            .map_samples(|reader, i| reader.array_at::<T>(i, path))
    }

    /// Like [`read`](Self::read) for a scalar of any kind.
    pub fn read_values(&self, type_name: &str, path: &str) -> Result<Vec<DecodedValue>, QueryError> {
        self.series(type_name)?
            .map_samples(|reader, i| reader.decoded_at(i, path))
    }

    /// A `char[N]` field from every sample, padding included.
    pub fn read_text(&self, type_name: &str, path: &str) -> Result<Vec<String>, QueryError> {
        self.series(type_name)?
            .map_samples(|reader, i| reader.text_at(i, path))
    }

    /// Human readable schema tree, for diagnostics.
    pub fn schema_description(&self, type_name: &str) -> Result<String, QueryError> {
        self.registry.describe(type_name)
    }

    /// A serializable overview of the log.
    pub fn summary(&self) -> LogSummary<'_> {
        let types = self
            .registry
            .iter()
            .map(|schema| TypeSummary {
                name: &schema.type_name,
                samples: self.sample_count(&schema.type_name),
                instances: self.samples.instances(&schema.type_name),
                byte_count: schema.byte_count().ok(),
            })
            .collect();
        LogSummary {
            version: self.header.version,
            start_timestamp_us: self.header.start_timestamp_us,
            types,
            info: &self.metadata.info,
            parameter_count: self.metadata.parameters.len(),
            log_line_count: self.metadata.log_lines.len(),
            dropout_count: self.metadata.dropouts.len(),
            dropout_ms: self.metadata.dropout_ms(),
            stream_end: self.stream_end,
            diagnostics: &self.diagnostics,
            suppressed_diagnostics: self.suppressed_diagnostics,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TypeSummary<'a> {
    pub name: &'a str,
    pub samples: usize,
    pub instances: Vec<u8>,
    /// `None` while a nested type is unresolved.
    pub byte_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogSummary<'a> {
    pub version: u8,
    pub start_timestamp_us: u64,
    pub types: Vec<TypeSummary<'a>>,
    pub info: &'a std::collections::BTreeMap<String, MetadataValue>,
    pub parameter_count: usize,
    pub log_line_count: usize,
    pub dropout_count: usize,
    pub dropout_ms: u64,
    pub stream_end: StreamEnd,
    pub diagnostics: &'a [Diagnostic],
    pub suppressed_diagnostics: usize,
}
