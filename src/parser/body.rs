//! Request body consumption.
//!
//! A [`BodyReader`] enforces the declared `Content-Length` and routes bytes to
//! one of three strategies: a bounded URL-encoded accumulator, the streaming
//! multipart scanner, or raw pass-through. Results are reported through a
//! sink as [`BodyEvent`]s so callers can forward file content without the
//! parser ever holding a whole upload.

use crate::parser::error::Error;
use crate::parser::limits::Limits;
use crate::parser::multipart::MultipartParser;
use crate::parser::param::Parameter;
use crate::parser::request::{BodyKind, Progress};
use crate::parser::urlencoded::parse_query;

/// Something the body parser found.
#[derive(Debug, PartialEq, Eq)]
pub enum BodyEvent<'a> {
    /// A complete form field or file descriptor.
    Param(Parameter),
    /// A multipart file part began.
    UploadStart {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
    },
    /// A run of file content at byte offset `index` within the file.
    UploadData {
        filename: &'a str,
        index: usize,
        data: &'a [u8],
    },
    /// The file part ended; `data` is the last, possibly empty, run.
    UploadEnd {
        filename: &'a str,
        index: usize,
        data: &'a [u8],
    },
    /// Opaque body bytes at offset `index` of a `total`-byte body.
    Raw {
        data: &'a [u8],
        index: usize,
        total: usize,
    },
}

#[derive(Debug)]
enum Strategy {
    UrlEncoded(Vec<u8>),
    Multipart(MultipartParser),
    Raw,
}

/// Consumes exactly `Content-Length` body bytes.
#[derive(Debug)]
pub struct BodyReader {
    strategy: Strategy,
    expected: usize,
    received: usize,
    max_params: usize,
}

impl BodyReader {
    pub fn new(kind: &BodyKind, expected: usize, limits: &Limits) -> Result<Self, Error> {
        let strategy = match kind {
            BodyKind::UrlEncoded => {
                if expected > limits.max_form_size {
                    return Err(Error::BodyTooLarge {
                        size: expected,
                        limit: limits.max_form_size,
                    });
                }
                Strategy::UrlEncoded(Vec::with_capacity(expected))
            }
            BodyKind::Multipart(boundary) => {
                Strategy::Multipart(MultipartParser::new(boundary, limits))
            }
            BodyKind::Raw | BodyKind::Empty => Strategy::Raw,
        };
        Ok(Self {
            strategy,
            expected,
            received: 0,
            max_params: limits.max_params,
        })
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    /// Consume a chunk of body bytes.
    ///
    /// Receiving more than the declared length fails the request, as does a
    /// multipart body that is complete by length but not by framing.
    pub fn feed<F>(&mut self, data: &[u8], sink: &mut F) -> Result<Progress, Error>
    where
        F: FnMut(BodyEvent<'_>),
    {
        let remaining = self.expected - self.received;
        if data.len() > remaining {
            return Err(Error::BodyLengthMismatch {
                expected: self.expected,
                received: self.received + data.len(),
            });
        }

        match &mut self.strategy {
            Strategy::UrlEncoded(buffer) => buffer.extend_from_slice(data),
            Strategy::Multipart(parser) => parser.feed(data, sink)?,
            Strategy::Raw => {
                if !data.is_empty() {
                    sink(BodyEvent::Raw {
                        data,
                        index: self.received,
                        total: self.expected,
                    });
                }
            }
        }
        self.received += data.len();

        if !self.is_complete() {
            return Ok(Progress::Partial);
        }
        self.finish(sink)?;
        Ok(Progress::Complete(data.len()))
    }

    fn finish<F>(&mut self, sink: &mut F) -> Result<(), Error>
    where
        F: FnMut(BodyEvent<'_>),
    {
        match &mut self.strategy {
            Strategy::UrlEncoded(buffer) => {
                let body = String::from_utf8_lossy(buffer).into_owned();
                buffer.clear();
                let params = parse_query(&body, true)?;
                if params.len() > self.max_params {
                    return Err(Error::TooManyParams(self.max_params));
                }
                for param in params {
                    sink(BodyEvent::Param(param));
                }
            }
            Strategy::Multipart(parser) if !parser.is_finished() => {
                return Err(Error::UnterminatedMultipart);
            }
            Strategy::Multipart(_) | Strategy::Raw => {}
        }
        Ok(())
    }
}
