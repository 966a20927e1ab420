//! Error types for the HTTP parser.

use thiserror::Error;

/// Outcome of a failed percent-decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A `%` escape was cut short by the end of the input.
    #[error("not enough hex digits after '%'")]
    NotEnoughDigits,

    /// A `%` escape was followed by something other than two hex digits.
    #[error("invalid characters in '%' escape")]
    InvalidCharacters,
}

/// Errors that can occur during HTTP request parsing.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP method in the request is not supported.
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The request path is invalid or missing.
    #[error("Invalid HTTP path")]
    InvalidPath,

    /// The request line is malformed (wrong format or missing components).
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// The HTTP version in the request is not supported.
    #[error("Unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    /// A line exceeded the configured maximum length.
    #[error("Line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// The request carried more headers than allowed.
    #[error("More than {0} headers")]
    TooManyHeaders(usize),

    /// The Content-Length header is not a valid size.
    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// A multipart Content-Type without a boundary parameter.
    #[error("Multipart request without boundary")]
    MissingBoundary,

    /// A percent-escape in the URL or a form body is malformed.
    #[error("URL decoding failed: {0}")]
    UrlDecode(#[from] DecodeError),

    /// The body carried more bytes than declared.
    #[error("Body length mismatch: expected {expected} bytes, received {received}")]
    BodyLengthMismatch { expected: usize, received: usize },

    /// A buffered body or form field is larger than its limit.
    #[error("Body of {size} bytes exceeds limit of {limit}")]
    BodyTooLarge { size: usize, limit: usize },

    /// The body carried more form fields or file parts than allowed.
    #[error("More than {0} form fields")]
    TooManyParams(usize),

    /// The multipart body violates the expected framing.
    #[error("Malformed multipart body: {0}")]
    MalformedMultipart(&'static str),

    /// The multipart body ended before its closing boundary.
    #[error("Multipart body ended before the final boundary")]
    UnterminatedMultipart,

    /// The input ended before the header block was complete.
    #[error("Incomplete request")]
    Incomplete,

    /// The request is empty.
    #[error("Empty request")]
    EmptyRequest,
}
