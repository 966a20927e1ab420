//! Error types for the HTTP server.

use thiserror::Error;

use crate::parser::Error as ParserError;

/// Errors that can occur during HTTP server operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A route pattern did not compile.
    #[error("Invalid route pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A declared-length content source ran dry early.
    #[error("Content source ended after {sent} of {expected} bytes")]
    SourceExhausted { expected: usize, sent: usize },

    /// The transport reported an error.
    #[error("Transport error {0}")]
    Transport(i8),

    /// The peer stopped acknowledging or sending in time.
    #[error("Connection timed out")]
    Timeout,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
