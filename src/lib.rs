//! Counts the distinct IPv4 addresses in a newline-delimited text file.
//!
//! The file is split into fixed-size chunks that a pool of worker threads read
//! with positional reads and parse in a single pass. Every valid address sets
//! one bit in a shared bitmap covering the whole IPv4 space; the answer is the
//! bitmap's population count once all workers are done.
//!
//! ```
//! use unique_ips::{count_unique, ScanConfig};
//!
//! let input = b"1.1.1.1\n1.1.1.1\n2.2.2.2\n";
//! let summary = count_unique(&input[..], &ScanConfig::default()).unwrap();
//! assert_eq!(summary.unique, 2);
//! ```

pub mod bitmap;
pub mod chunk;
pub mod config;
pub mod error;
pub mod parse;
pub mod scan;
pub mod source;

pub use bitmap::PresenceBitmap;
pub use config::ScanConfig;
pub use error::ScanError;
pub use scan::{count_unique, scan_into, ScanStats, ScanSummary};
pub use source::{ChunkSource, MappedFile, PositionalFile};
