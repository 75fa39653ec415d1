//! Error types for a unique-address scan.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal error that aborts a scan with no partial result.
///
/// Malformed lines are not errors at this level: they are counted and logged
/// by the worker that owns them, and the scan carries on.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScanError {
    /// The input file could not be opened or stat-ed.
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Memory mapping the input file failed.
    #[error("cannot map {}: {source}", .path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A positional read failed part way through the scan.
    #[error("read error at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// The scan configuration breaks one of its preconditions.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ScanError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        ScanError::InvalidConfig {
            message: message.into(),
        }
    }
}
