//! ULog decoding.
//!
//! The whole log is parsed once, eagerly, into a [`ParsedLog`]. All reads
//! happen afterwards against that immutable snapshot.
//!
//! # Module Organization
//!
//! - [`codec`]: fixed-width primitive decoding
//! - [`frame`]: file header and frame extraction
//! - [`schema`]: format definitions and forward-reference resolution
//! - [`path`]: dotted field paths and byte offsets
//! - [`store`]: channel bindings and raw samples
//! - [`series`]: typed reads over one type's samples
//! - [`messages`]: info, parameter, log line, dropout and flag records
//! - [`log`]: the loader and [`ParsedLog`]

pub mod codec;
mod config;
mod error;
pub mod frame;
pub mod log;
pub mod messages;
pub mod path;
pub mod schema;
pub mod series;
pub mod store;

pub use codec::{DecodedValue, Primitive, PrimitiveKind};
pub use config::LoadConfig;
pub use error::{LoadError, QueryError};
pub use frame::{FileHeader, RecordKind, StreamEnd};
pub use log::{load_log, load_log_file, load_log_with, Diagnostic, LogSummary, ParsedLog};
pub use messages::{LogLevel, LogLine, LogMetadata, MetadataValue};
pub use path::ResolvedPath;
pub use schema::{CompositeRef, Property, Schema, SchemaRegistry};
pub use series::SeriesReader;
