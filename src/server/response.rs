//! HTTP response types and the emission state machine.
//!
//! A response moves through `Setup → Headers → Content → WaitAck → End`,
//! with `Failed` reachable from any state before `End`. Content is pulled
//! from a [`ContentSource`] only when the transport reports free send
//! window, so no call ever blocks: a source that has nothing yet answers
//! [`Fill::TryAgain`] and is asked again, at the same offset, on the next
//! writable opportunity.

use std::fmt;
use std::io;

use log::{debug, warn};
use serde::Serialize;

use crate::parser::{Error as ParserError, Headers, HttpVersion};
use crate::server::connection::Transport;
use crate::server::error::Error;
use crate::server::template::{TemplateFilter, TemplateProcessor};

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Continue = 100,
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,
    TemporaryRedirect = 307,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    RequestTimeout = 408,
    LengthRequired = 411,
    PayloadTooLarge = 413,
    UriTooLong = 414,
    UnsupportedMediaType = 415,
    RequestHeaderFieldsTooLarge = 431,
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
    HttpVersionNotSupported = 505,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::SeeOther => "See Other",
            StatusCode::NotModified => "Not Modified",
            StatusCode::TemporaryRedirect => "Temporary Redirect",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::RequestTimeout => "Request Time-out",
            StatusCode::LengthRequired => "Length Required",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::UriTooLong => "URI Too Long",
            StatusCode::UnsupportedMediaType => "Unsupported Media Type",
            StatusCode::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::HttpVersionNotSupported => "HTTP Version not supported",
        }
    }

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

impl From<&ParserError> for StatusCode {
    fn from(err: &ParserError) -> Self {
        match err {
            ParserError::UnsupportedMethod(_) => StatusCode::NotImplemented,
            ParserError::UnsupportedVersion(_) => StatusCode::HttpVersionNotSupported,
            ParserError::TooManyHeaders(_) => StatusCode::RequestHeaderFieldsTooLarge,
            ParserError::BodyTooLarge { .. } | ParserError::TooManyParams(_) => {
                StatusCode::PayloadTooLarge
            }
            _ => StatusCode::BadRequest,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Where a response currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// Status, headers and content may still be changed.
    Setup,
    /// The header block is queued but not fully accepted by the transport.
    Headers,
    /// Content is being pulled and queued.
    Content,
    /// Everything is queued; waiting for the peer to acknowledge it.
    WaitAck,
    /// The peer acknowledged every byte.
    End,
    /// The transport failed or timed out.
    Failed,
}

/// Result of asking a [`ContentSource`] for more bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// This many bytes were written to the buffer. Zero ends a chunked body.
    Ready(usize),
    /// Nothing is available yet; ask again at the same offset later.
    TryAgain,
}

/// Pull-based producer of response content.
pub trait ContentSource {
    /// Write up to `buf.len()` bytes of content starting at byte `index`.
    fn fill(&mut self, buf: &mut [u8], index: usize) -> Fill;
}

impl<F> ContentSource for F
where
    F: FnMut(&mut [u8], usize) -> Fill,
{
    fn fill(&mut self, buf: &mut [u8], index: usize) -> Fill {
        self(buf, index)
    }
}

/// Unbounded in-memory transport used by [`HttpResponse::to_bytes`].
struct Collector(Vec<u8>);

impl Transport for Collector {
    fn space(&self) -> usize {
        16 * 1024
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.0.extend_from_slice(data);
        data.len()
    }

    fn close(&mut self) {}
}

struct BytesSource(Vec<u8>);

impl ContentSource for BytesSource {
    fn fill(&mut self, buf: &mut [u8], index: usize) -> Fill {
        let rest = self.0.get(index..).unwrap_or_default();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Fill::Ready(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(usize),
    Chunked,
}

/// Represents an HTTP response.
pub struct HttpResponse {
    status: StatusCode,
    headers: Headers,
    content_type: Option<String>,
    framing: Framing,
    source: Option<Box<dyn ContentSource>>,
    template: Option<TemplateFilter>,
    state: ResponseState,
    chunked_wire: bool,
    head_only: bool,
    head_len: usize,
    sent_len: usize,
    written_len: usize,
    acked_len: usize,
    outbox: Vec<u8>,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            content_type: None,
            framing: Framing::Length(0),
            source: None,
            template: None,
            state: ResponseState::Setup,
            chunked_wire: false,
            head_only: false,
            head_len: 0,
            sent_len: 0,
            written_len: 0,
            acked_len: 0,
            outbox: Vec::new(),
        }
    }

    /// A declared-length response whose `len` content bytes come from `source`.
    pub fn from_source<S>(content_type: impl Into<String>, len: usize, source: S) -> Self
    where
        S: ContentSource + 'static,
    {
        let mut response = Self::new(StatusCode::Ok).with_content_type(content_type);
        response.framing = Framing::Length(len);
        response.source = Some(Box::new(source));
        response
    }

    /// A chunked response; the body ends when `source` returns `Fill::Ready(0)`.
    pub fn chunked<S>(content_type: impl Into<String>, source: S) -> Self
    where
        S: ContentSource + 'static,
    {
        let mut response = Self::new(StatusCode::Ok).with_content_type(content_type);
        response.framing = Framing::Chunked;
        response.source = Some(Box::new(source));
        response
    }

    /// A `302 Found` pointing at `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(StatusCode::Found).with_header("Location", location)
    }

    /// Set the response body with a string.
    pub fn with_body_string(self, body: impl Into<String>) -> Self {
        self.with_body_bytes(body.into().into_bytes())
    }

    /// Set the response body with bytes.
    pub fn with_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.framing = Framing::Length(body.len());
        self.source = Some(Box::new(BytesSource(body)));
        self
    }

    /// Add a header. Duplicates are kept.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.set_content_type(content_type);
        self
    }

    /// Set the status code.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.set_status(status);
        self
    }

    /// Run content through `processor` for every `%NAME%` placeholder.
    ///
    /// The output length is unknown in advance, so a declared-length
    /// response loses its `Content-Length` and ends with the connection.
    pub fn with_template<F>(mut self, processor: F) -> Self
    where
        F: Fn(&str) -> String + 'static,
    {
        let processor: TemplateProcessor = Box::new(processor);
        self.template = Some(TemplateFilter::new(processor));
        self
    }

    /// Set the response body with a JSON value.
    ///
    /// This method serializes the provided value to JSON and sets it as the response body.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, Error> {
        let json = serde_json::to_vec(value).map_err(Error::JsonError)?;
        Ok(self
            .with_content_type("application/json")
            .with_body_bytes(json))
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if self.state == ResponseState::Setup {
            self.status = status;
        }
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        if self.state == ResponseState::Setup {
            self.content_type = Some(content_type.into());
        }
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.state == ResponseState::Setup {
            self.headers.add(name, value);
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The declared content length, or `None` for a chunked body.
    pub fn content_length(&self) -> Option<usize> {
        match self.framing {
            Framing::Length(len) => Some(len),
            Framing::Chunked => None,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.framing == Framing::Chunked
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state != ResponseState::Setup
    }

    /// Whether the response reached `End` or `Failed`.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ResponseState::End | ResponseState::Failed)
    }

    pub fn is_failed(&self) -> bool {
        self.state == ResponseState::Failed
    }

    /// Length of the status line and header block.
    pub fn head_len(&self) -> usize {
        self.head_len
    }

    /// Content bytes pulled from the source so far.
    pub fn sent_len(&self) -> usize {
        self.sent_len
    }

    /// Bytes the transport accepted, framing and head included.
    pub fn written_len(&self) -> usize {
        self.written_len
    }

    /// Bytes the peer acknowledged.
    pub fn acked_len(&self) -> usize {
        self.acked_len
    }

    /// Bytes produced so far: written plus still waiting for send window.
    pub fn queued_len(&self) -> usize {
        self.written_len + self.outbox.len()
    }

    fn has_body(&self) -> bool {
        !self.head_only
            && self.source.is_some()
            && match self.framing {
                Framing::Length(len) => len > 0,
                Framing::Chunked => true,
            }
    }

    fn sends_content_length(&self) -> bool {
        matches!(self.framing, Framing::Length(_)) && self.template.is_none()
    }

    /// Render the complete response for a one-shot write.
    ///
    /// Rendering stops early if the content source answers
    /// [`Fill::TryAgain`] and nothing else can move.
    pub fn to_bytes(mut self, version: HttpVersion, defaults: &Headers) -> Vec<u8> {
        let mut sink = Collector(Vec::new());
        if self.respond(version, false, defaults, &mut sink).is_err() {
            return sink.0;
        }
        while !self.is_finished() {
            let before = (self.state, self.written_len, self.queued_len());
            self.ack(self.written_len - self.acked_len);
            if self.pump(&mut sink).is_err() {
                break;
            }
            if before == (self.state, self.written_len, self.queued_len()) {
                break;
            }
        }
        sink.0
    }

    /// Build the status line and header block.
    pub(crate) fn assemble_head(&self, version: HttpVersion, defaults: &Headers) -> String {
        let mut out = String::new();
        out.push_str(&format!("{version} {}\r\n", self.status));
        for header in defaults.iter().chain(self.headers.iter()) {
            out.push_str(&header.to_string());
        }
        if let (true, Framing::Length(len)) = (self.sends_content_length(), self.framing) {
            out.push_str(&format!("Content-Length: {len}\r\n"));
        }
        if let Some(content_type) = &self.content_type {
            out.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        if version == HttpVersion::Http11 {
            out.push_str("Accept-Ranges: none\r\n");
            if self.chunked_wire {
                out.push_str("Transfer-Encoding: chunked\r\n");
            }
        }
        if !self.headers.contains("Connection") {
            out.push_str("Connection: close\r\n");
        }
        out.push_str("\r\n");
        out
    }

    /// Leave `Setup`: queue the header block and start streaming.
    pub(crate) fn respond(
        &mut self,
        version: HttpVersion,
        head_only: bool,
        defaults: &Headers,
        transport: &mut dyn Transport,
    ) -> Result<(), Error> {
        if self.state != ResponseState::Setup {
            return Ok(());
        }
        self.head_only = head_only;
        self.chunked_wire = self.framing == Framing::Chunked && version == HttpVersion::Http11;

        let head = self.assemble_head(version, defaults);
        self.head_len = head.len();
        self.outbox = head.into_bytes();
        self.state = ResponseState::Headers;
        debug!(
            "Responding {} ({})",
            self.status,
            match (self.framing, self.chunked_wire) {
                (Framing::Chunked, true) => "chunked".to_string(),
                (Framing::Chunked, false) => "until close".to_string(),
                (Framing::Length(len), _) => format!("{len} bytes"),
            }
        );
        self.pump(transport)
    }

    /// Record a peer acknowledgement. The counter never passes `written_len`.
    pub(crate) fn ack(&mut self, len: usize) {
        let acked = self.acked_len + len;
        if acked > self.written_len {
            warn!(
                "Peer acknowledged {acked} bytes but only {} were written",
                self.written_len
            );
        }
        self.acked_len = acked.min(self.written_len);
    }

    /// Use a writable opportunity: drain queued bytes, pull at most one block
    /// of content, and settle into `End` once everything is acknowledged.
    pub(crate) fn pump(&mut self, transport: &mut dyn Transport) -> Result<(), Error> {
        if matches!(
            self.state,
            ResponseState::Setup | ResponseState::End | ResponseState::Failed
        ) {
            return Ok(());
        }

        self.drain(transport);
        if !self.outbox.is_empty() {
            return Ok(());
        }

        if self.state == ResponseState::Headers {
            self.state = if self.has_body() {
                ResponseState::Content
            } else {
                ResponseState::WaitAck
            };
        }

        if self.state == ResponseState::Content {
            if let Err(e) = self.pull(transport) {
                self.fail();
                return Err(e);
            }
            self.drain(transport);
        }

        if self.state == ResponseState::WaitAck
            && self.outbox.is_empty()
            && self.acked_len >= self.written_len
        {
            self.state = ResponseState::End;
        }
        Ok(())
    }

    /// Drop everything and enter `Failed`, unless already at `End`.
    pub(crate) fn fail(&mut self) {
        if self.state != ResponseState::End {
            self.state = ResponseState::Failed;
            self.outbox.clear();
            self.source = None;
        }
    }

    fn drain(&mut self, transport: &mut dyn Transport) {
        if self.outbox.is_empty() {
            return;
        }
        let n = transport.space().min(self.outbox.len());
        if n == 0 {
            return;
        }
        let accepted = transport.write(&self.outbox[..n]).min(n);
        self.written_len += accepted;
        self.outbox.drain(..accepted);
    }

    fn pull(&mut self, transport: &mut dyn Transport) -> Result<(), Error> {
        let space = transport.space();
        if space == 0 {
            return Ok(());
        }

        let mut max = space;
        if self.chunked_wire {
            // "<hex>\r\n" before the block and "\r\n" after it. A window
            // smaller than one frame still gets a one-byte block, which
            // drains from the outbox over the next opportunities.
            let overhead = format!("{space:x}").len() + 4;
            max = space.saturating_sub(overhead).max(1);
        }
        if let Framing::Length(total) = self.framing {
            max = max.min(total - self.sent_len);
        }

        let Some(source) = self.source.as_mut() else {
            self.finish();
            return Ok(());
        };

        let mut buf = vec![0u8; max];
        match source.fill(&mut buf, self.sent_len) {
            Fill::TryAgain => Ok(()),
            Fill::Ready(0) => match self.framing {
                Framing::Chunked => {
                    self.finish();
                    Ok(())
                }
                Framing::Length(expected) => Err(Error::SourceExhausted {
                    expected,
                    sent: self.sent_len,
                }),
            },
            Fill::Ready(n) => {
                let n = n.min(max);
                self.sent_len += n;
                buf.truncate(n);
                let block = match &mut self.template {
                    Some(template) => template.process(&buf, false),
                    None => buf,
                };
                self.queue_block(&block);
                if let Framing::Length(total) = self.framing {
                    if self.sent_len >= total {
                        self.finish();
                    }
                }
                Ok(())
            }
        }
    }

    fn finish(&mut self) {
        if let Some(template) = &mut self.template {
            let tail = template.process(&[], true);
            self.queue_block(&tail);
        }
        if self.chunked_wire {
            self.outbox.extend_from_slice(b"0\r\n\r\n");
        }
        self.source = None;
        self.state = ResponseState::WaitAck;
    }

    fn queue_block(&mut self, block: &[u8]) {
        if block.is_empty() {
            return;
        }
        if self.chunked_wire {
            let size = format!("{:x}\r\n", block.len());
            self.outbox.extend_from_slice(size.as_bytes());
            self.outbox.extend_from_slice(block);
            self.outbox.extend_from_slice(b"\r\n");
        } else {
            self.outbox.extend_from_slice(block);
        }
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .field("framing", &self.framing)
            .field("state", &self.state)
            .field("head_len", &self.head_len)
            .field("sent_len", &self.sent_len)
            .field("written_len", &self.written_len)
            .field("acked_len", &self.acked_len)
            .finish_non_exhaustive()
    }
}

/// A response body written piecewise before it is sent.
///
/// Collects everything written through [`io::Write`] or [`fmt::Write`] and
/// turns into a declared-length [`HttpResponse`].
#[derive(Debug)]
pub struct ResponseStream {
    status: StatusCode,
    content_type: String,
    headers: Headers,
    buffer: Vec<u8>,
}

impl ResponseStream {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self::with_capacity(content_type, 1460)
    }

    pub fn with_capacity(content_type: impl Into<String>, capacity: usize) -> Self {
        Self {
            status: StatusCode::Ok,
            content_type: content_type.into(),
            headers: Headers::new(),
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.add(name, value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_response(self) -> HttpResponse {
        let mut response = HttpResponse::new(self.status)
            .with_content_type(self.content_type)
            .with_body_bytes(self.buffer);
        response.headers = self.headers;
        response
    }
}

impl io::Write for ResponseStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Write for ResponseStream {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buffer.extend_from_slice(s.as_bytes());
        Ok(())
    }
}
