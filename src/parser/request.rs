//! Incremental request-head parsing.
//!
//! [`HeadParser`] consumes the request line and header block from byte
//! chunks of any size. It keeps only the current partial line between calls,
//! so a line, a token or a `\r\n` terminator may be split anywhere.

use std::str::FromStr;

use log::debug;

use crate::parser::error::Error;
use crate::parser::header::{Header, Headers};
use crate::parser::limits::Limits;
use crate::parser::method::Method;
use crate::parser::param::Params;
use crate::parser::urlencoded::{parse_query, url_decode};
use crate::parser::version::HttpVersion;

/// Credentials carried in the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The base64 token following `Basic `.
    Basic(String),
    /// The parameter list following `Digest `.
    Digest(String),
}

/// How the request body must be consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    /// No body was declared.
    Empty,
    /// `application/x-www-form-urlencoded`.
    UrlEncoded,
    /// `multipart/form-data` with the given boundary.
    Multipart(String),
    /// Anything else; streamed to the body callback untouched.
    Raw,
}

/// The parsed request line and header block.
#[derive(Debug, Clone, Default)]
pub struct RequestHead {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The decoded request path, without the query string
    pub url: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The retained headers, in arrival order
    pub headers: Headers,
    /// Query parameters, followed by body parameters once the body is parsed
    pub params: Params,
    pub host: Option<String>,
    /// The media type of `Content-Type`, without parameters
    pub content_type: Option<String>,
    pub content_length: usize,
    pub boundary: Option<String>,
    pub expect_continue: bool,
    pub authorization: Option<Authorization>,
}

impl RequestHead {
    /// Header names the parser always interprets and keeps.
    pub const SPECIAL_HEADERS: [&'static str; 5] = [
        "Host",
        "Content-Type",
        "Content-Length",
        "Expect",
        "Authorization",
    ];

    pub fn is_special_header(name: &str) -> bool {
        Self::SPECIAL_HEADERS
            .iter()
            .any(|special| special.eq_ignore_ascii_case(name))
    }

    pub fn is_multipart(&self) -> bool {
        self.boundary.is_some()
    }

    pub fn body_kind(&self) -> BodyKind {
        if let Some(boundary) = &self.boundary {
            return BodyKind::Multipart(boundary.clone());
        }
        if self.content_length == 0 {
            return BodyKind::Empty;
        }
        match self.content_type.as_deref() {
            Some(ct) if ct.eq_ignore_ascii_case("application/x-www-form-urlencoded") => {
                BodyKind::UrlEncoded
            }
            _ => BodyKind::Raw,
        }
    }

    fn apply_request_line(&mut self, line: &str) -> Result<(), Error> {
        let mut parts = line.splitn(3, ' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) if !m.is_empty() => (m, t, v.trim()),
            _ => return Err(Error::MalformedRequestLine(line.to_string())),
        };

        self.method = Method::from_str(method)?;
        if target.is_empty() {
            return Err(Error::InvalidPath);
        }
        self.version = HttpVersion::from_str(version)?;

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        self.url = url_decode(path)?;
        if let Some(query) = query {
            self.params.extend(parse_query(query, false)?);
        }
        Ok(())
    }

    fn apply_header(&mut self, header: &Header) -> Result<(), Error> {
        let name = header.name();
        let value = header.value();

        if name.eq_ignore_ascii_case("Host") {
            self.host = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("Content-Length") {
            self.content_length = value
                .parse()
                .map_err(|_| Error::InvalidContentLength(value.to_string()))?;
        } else if name.eq_ignore_ascii_case("Content-Type") {
            let mut parts = value.split(';');
            let media_type = parts.next().unwrap_or_default().trim();
            if strip_prefix_ci(media_type, "multipart/").is_some() {
                let boundary = parts
                    .filter_map(|p| p.trim().split_once('='))
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
                    .map(|(_, v)| v.trim().trim_matches('"').to_string())
                    .filter(|b| !b.is_empty())
                    .ok_or(Error::MissingBoundary)?;
                self.boundary = Some(boundary);
            }
            self.content_type = Some(media_type.to_string());
        } else if name.eq_ignore_ascii_case("Expect") {
            self.expect_continue =
                value.eq_ignore_ascii_case("100-continue") && self.version == HttpVersion::Http11;
        } else if name.eq_ignore_ascii_case("Authorization") {
            self.authorization = if let Some(token) = strip_prefix_ci(value, "Basic ") {
                Some(Authorization::Basic(token.trim().to_string()))
            } else {
                strip_prefix_ci(value, "Digest ").map(|rest| Authorization::Digest(rest.trim().to_string()))
            };
        }
        Ok(())
    }
}

fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    match value.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&value[prefix.len()..]),
        _ => None,
    }
}

/// Result of feeding bytes to an incremental parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// All input was consumed and more is needed.
    Partial,
    /// The parser finished after consuming this many bytes of the last chunk.
    Complete(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    RequestLine,
    Headers,
    Done,
}

/// Resumable parser for the request line and header block.
#[derive(Debug)]
pub struct HeadParser {
    line: Vec<u8>,
    state: HeadState,
    header_count: usize,
    limits: Limits,
    head: RequestHead,
}

impl HeadParser {
    pub fn new(limits: Limits) -> Self {
        Self {
            line: Vec::new(),
            state: HeadState::RequestLine,
            header_count: 0,
            limits,
            head: RequestHead::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == HeadState::Done
    }

    /// Consume a chunk. Stops right after the blank line ending the head;
    /// bytes past that point belong to the body.
    pub fn feed(&mut self, data: &[u8]) -> Result<Progress, Error> {
        let mut offset = 0;
        while self.state != HeadState::Done {
            let rest = &data[offset..];
            match rest.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.append(&rest[..end])?;
                    offset += end + 1;
                    self.finish_line()?;
                }
                None => {
                    self.append(rest)?;
                    return Ok(Progress::Partial);
                }
            }
        }
        Ok(Progress::Complete(offset))
    }

    /// The request's HTTP version, once the request line has been accepted.
    pub fn version(&self) -> Option<HttpVersion> {
        (self.state != HeadState::RequestLine).then_some(self.head.version)
    }

    /// Hand over the parsed head, leaving an empty one behind.
    pub fn take_head(&mut self) -> RequestHead {
        std::mem::take(&mut self.head)
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        // The limit counts line content; a trailing '\r' is allowed on top.
        if self.line.len() + bytes.len() > self.limits.max_line_length + 1 {
            return Err(Error::LineTooLong {
                limit: self.limits.max_line_length,
            });
        }
        self.line.extend_from_slice(bytes);
        Ok(())
    }

    fn finish_line(&mut self) -> Result<(), Error> {
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        if self.line.len() > self.limits.max_line_length {
            return Err(Error::LineTooLong {
                limit: self.limits.max_line_length,
            });
        }
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();

        match self.state {
            HeadState::RequestLine => {
                if line.is_empty() {
                    return Err(Error::EmptyRequest);
                }
                self.head.apply_request_line(&line)?;
                debug!(
                    "Request line: {} {} {}",
                    self.head.method, self.head.url, self.head.version
                );
                self.state = HeadState::Headers;
            }
            HeadState::Headers if line.is_empty() => {
                self.state = HeadState::Done;
            }
            HeadState::Headers => {
                let Some(header) = Header::parse(&line) else {
                    debug!("Discarding malformed header line: {line}");
                    return Ok(());
                };
                self.header_count += 1;
                if self.header_count > self.limits.max_headers {
                    return Err(Error::TooManyHeaders(self.limits.max_headers));
                }
                self.head.apply_header(&header)?;
                self.head.headers.push(header);
            }
            HeadState::Done => {}
        }
        Ok(())
    }
}

/// Parse a complete request head from a byte slice.
///
/// Convenience wrapper around [`HeadParser`] for input that is already
/// fully buffered; any bytes after the blank line are ignored.
pub fn parse_request(input: &[u8]) -> Result<RequestHead, Error> {
    if input.is_empty() {
        return Err(Error::EmptyRequest);
    }
    let mut parser = HeadParser::new(Limits::default());
    match parser.feed(input)? {
        Progress::Complete(_) => Ok(parser.take_head()),
        Progress::Partial => Err(Error::Incomplete),
    }
}
