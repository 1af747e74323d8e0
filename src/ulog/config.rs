//! Load configuration.

/// Configuration for loading a log.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Inputs larger than this are rejected before any parsing happens.
    /// Applies to the decompressed size for gzip inputs.
    pub max_log_bytes: u64,

    /// Maximum number of per-frame diagnostics kept on the parsed log.
    /// Further drops are only counted.
    pub max_diagnostics: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            // 1 GiB
            max_log_bytes: 1 << 30,
            max_diagnostics: 100,
        }
    }
}
