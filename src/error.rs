use std::num::ParseIntError;
use thiserror::Error;

/// Errors raised by the demultiplexer and its collaborators.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// Failure reported by the underlying byte source
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No packet synchronization pattern was found at open
    #[error("no TS sync pattern found")]
    NoSync,

    /// Malformed table section, descriptor or PES header
    #[error("parser error: {0}")]
    Parser(String),

    /// Structurally invalid input data
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The source or sink does not implement the requested capability
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Malformed descrambling control word
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid textual option value
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Integer parse failure in an option string
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DemuxError>;
