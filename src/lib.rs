//! ulogview library - decode ULog flight logs into typed time series.
//!
//! A ULog file carries its own schema: format definitions describe every
//! logged type, and data frames carry packed samples of those types. This
//! crate parses the whole file once and then answers typed queries by
//! dotted field path.
//!
//! # Modules
//!
//! - [`ulog`] - the decoder: frames, schemas, paths, samples, metadata
//! - [`domain`] - vectors, quaternions and timestamped series built on top
//!
//! # Example
//!
//! ```no_run
//! use ulogview::{load_log_file, LoadConfig};
//! use std::path::Path;
//!
//! let log = load_log_file(Path::new("flight.ulg"), &LoadConfig::default())
//!     .expect("Failed to load log");
//! let altitude: Vec<f32> = log
//!     .read("vehicle_local_position", "z")
//!     .expect("Failed to read altitude");
//! println!("{} samples", altitude.len());
//! ```

pub mod domain;
pub mod ulog;

// Re-export for convenience
pub use ulog::{
    load_log, load_log_file, load_log_with, DecodedValue, Diagnostic, LoadConfig, LoadError,
    ParsedLog, Primitive, PrimitiveKind, Property, QueryError, ResolvedPath, Schema,
    SeriesReader, StreamEnd,
};
