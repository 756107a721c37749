//! Error types for constraint extraction.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that abort processing.
#[derive(Debug, Error)]
pub enum Error {
    /// The alignment source could not be opened. Nothing useful can be built
    /// without it, so callers treat this as fatal.
    #[error("cannot open alignment source {}: {source}", path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error while streaming records or reading inputs.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A reference name that the BAM header does not define.
    #[error("reference '{0}' not found in BAM header")]
    UnknownReference(String),

    /// Malformed line in the subexon table.
    #[error("invalid subexon table at line {line}: {msg}")]
    SubexonParse { line: usize, msg: String },
}

/// Reasons a single decoded record is rejected by the alignment source.
///
/// These never abort a run: the record is logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("alignment has {count} exonic segments, more than the maximum of {max}")]
    TooManySegments { count: usize, max: usize },

    #[error("CIGAR read length {cigar} does not match sequence length {sequence}")]
    QueryLengthMismatch { cigar: usize, sequence: usize },

    #[error("invalid CIGAR: {0}")]
    InvalidCigar(String),

    #[error("alignment has no aligned reference bases")]
    NoAlignedBases,

    #[error("mapped record has no reference id or alignment start")]
    MissingPosition,
}
