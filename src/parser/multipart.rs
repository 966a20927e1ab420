//! Streaming `multipart/form-data` scanner.
//!
//! The scanner looks at one byte at a time and never needs to see more than
//! one byte ahead, so a boundary may be split over any number of chunks.
//! The only bytes it holds back are a partial delimiter match; those are
//! known to equal a prefix of the delimiter and are replayed as content when
//! the match breaks.
//!
//! File content passes through a buffer of `upload_buffer_size` bytes and is
//! flushed to the sink whenever the buffer fills. Ordinary fields are kept
//! in memory up to `max_form_size` bytes.

use log::debug;

use crate::parser::body::BodyEvent;
use crate::parser::error::Error;
use crate::parser::limits::Limits;
use crate::parser::param::Parameter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first boundary; bytes are discarded.
    Preamble,
    /// Right after a delimiter: either `--` or `\r\n` follows.
    AfterDelimiter,
    /// Saw the first `-` of the closing `--`.
    ClosingDash,
    /// Saw the `\r` ending a boundary line.
    BoundaryLineFeed,
    /// Reading the part's own header lines.
    PartHeaders,
    /// Reading part content.
    Content,
    /// After the closing boundary; the epilogue is ignored.
    Finished,
}

#[derive(Debug, Default)]
struct Part {
    name: String,
    filename: Option<String>,
    content_type: String,
    value: Vec<u8>,
    /// File bytes already flushed to the sink.
    flushed: usize,
}

#[derive(Debug)]
pub struct MultipartParser {
    /// `\r\n--` followed by the boundary.
    delimiter: Vec<u8>,
    matched: usize,
    state: State,
    line: Vec<u8>,
    part: Part,
    /// Parts opened so far, fields and files alike.
    parts: usize,
    file_buffer: Vec<u8>,
    limits: Limits,
}

impl MultipartParser {
    pub fn new(boundary: &str, limits: &Limits) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            delimiter,
            // The first boundary has no preceding line break.
            matched: 2,
            state: State::Preamble,
            line: Vec::new(),
            part: Part::default(),
            parts: 0,
            file_buffer: Vec::with_capacity(limits.upload_buffer_size),
            limits: *limits,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    pub fn feed<F>(&mut self, data: &[u8], sink: &mut F) -> Result<(), Error>
    where
        F: FnMut(BodyEvent<'_>),
    {
        for &byte in data {
            self.step(byte, sink)?;
        }
        Ok(())
    }

    fn step<F>(&mut self, byte: u8, sink: &mut F) -> Result<(), Error>
    where
        F: FnMut(BodyEvent<'_>),
    {
        match self.state {
            State::Preamble | State::Content => self.scan(byte, sink)?,
            State::AfterDelimiter => match byte {
                b'-' => self.state = State::ClosingDash,
                b'\r' => self.state = State::BoundaryLineFeed,
                _ => return Err(Error::MalformedMultipart("expected line break after boundary")),
            },
            State::ClosingDash => {
                if byte != b'-' {
                    return Err(Error::MalformedMultipart("expected '--' after final boundary"));
                }
                self.state = State::Finished;
            }
            State::BoundaryLineFeed => {
                if byte != b'\n' {
                    return Err(Error::MalformedMultipart("expected line feed after boundary"));
                }
                if self.parts == self.limits.max_params {
                    return Err(Error::TooManyParams(self.limits.max_params));
                }
                self.parts += 1;
                self.part = Part::default();
                self.line.clear();
                self.state = State::PartHeaders;
            }
            State::PartHeaders => {
                if byte != b'\n' {
                    if self.line.len() > self.limits.max_line_length {
                        return Err(Error::LineTooLong {
                            limit: self.limits.max_line_length,
                        });
                    }
                    self.line.push(byte);
                    return Ok(());
                }
                if self.line.last() == Some(&b'\r') {
                    self.line.pop();
                }
                if self.line.is_empty() {
                    self.begin_content(sink);
                } else {
                    let line = String::from_utf8_lossy(&self.line).into_owned();
                    self.apply_part_header(&line);
                    self.line.clear();
                }
            }
            State::Finished => {}
        }
        Ok(())
    }

    /// Match `byte` against the delimiter, replaying a broken partial match.
    fn scan<F>(&mut self, byte: u8, sink: &mut F) -> Result<(), Error>
    where
        F: FnMut(BodyEvent<'_>),
    {
        if byte == self.delimiter[self.matched] {
            self.matched += 1;
            if self.matched == self.delimiter.len() {
                self.matched = 0;
                if self.state == State::Content {
                    self.end_part(sink);
                }
                self.state = State::AfterDelimiter;
            }
            return Ok(());
        }

        if self.matched > 0 {
            if self.state == State::Content {
                for i in 0..self.matched {
                    let held = self.delimiter[i];
                    self.push_content(held, sink)?;
                }
            }
            self.matched = 0;
        }

        // Boundaries cannot contain CR, so a broken match can only restart here.
        if byte == self.delimiter[0] {
            self.matched = 1;
        } else if self.state == State::Content {
            self.push_content(byte, sink)?;
        }
        Ok(())
    }

    fn push_content<F>(&mut self, byte: u8, sink: &mut F) -> Result<(), Error>
    where
        F: FnMut(BodyEvent<'_>),
    {
        match &self.part.filename {
            Some(filename) => {
                self.file_buffer.push(byte);
                if self.file_buffer.len() >= self.limits.upload_buffer_size {
                    sink(BodyEvent::UploadData {
                        filename,
                        index: self.part.flushed,
                        data: &self.file_buffer,
                    });
                    self.part.flushed += self.file_buffer.len();
                    self.file_buffer.clear();
                }
            }
            None => {
                if self.part.value.len() >= self.limits.max_form_size {
                    return Err(Error::BodyTooLarge {
                        size: self.part.value.len() + 1,
                        limit: self.limits.max_form_size,
                    });
                }
                self.part.value.push(byte);
            }
        }
        Ok(())
    }

    fn apply_part_header(&mut self, line: &str) {
        let Some((name, value)) = line.split_once(':') else {
            debug!("Discarding malformed part header: {line}");
            return;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("Content-Disposition") {
            for attr in value.split(';').skip(1) {
                let Some((key, val)) = attr.trim().split_once('=') else {
                    continue;
                };
                let val = val.trim().trim_matches('"');
                if key.trim().eq_ignore_ascii_case("name") {
                    self.part.name = val.to_string();
                } else if key.trim().eq_ignore_ascii_case("filename") {
                    self.part.filename = Some(val.to_string());
                }
            }
        } else if name.eq_ignore_ascii_case("Content-Type") {
            self.part.content_type = value.to_string();
        }
    }

    fn begin_content<F>(&mut self, sink: &mut F)
    where
        F: FnMut(BodyEvent<'_>),
    {
        self.state = State::Content;
        self.matched = 0;
        self.file_buffer.clear();
        if let Some(filename) = &self.part.filename {
            debug!("Upload of '{filename}' started for field '{}'", self.part.name);
            sink(BodyEvent::UploadStart {
                name: &self.part.name,
                filename,
                content_type: &self.part.content_type,
            });
        }
    }

    fn end_part<F>(&mut self, sink: &mut F)
    where
        F: FnMut(BodyEvent<'_>),
    {
        let part = std::mem::take(&mut self.part);
        match part.filename {
            Some(filename) => {
                sink(BodyEvent::UploadEnd {
                    filename: &filename,
                    index: part.flushed,
                    data: &self.file_buffer,
                });
                let size = part.flushed + self.file_buffer.len();
                self.file_buffer.clear();
                sink(BodyEvent::Param(Parameter::file(part.name, filename, size)));
            }
            None => {
                let value = String::from_utf8_lossy(&part.value).into_owned();
                sink(BodyEvent::Param(Parameter::form(part.name, value)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut MultipartParser, chunks: &[&[u8]]) -> Vec<String> {
        let mut events = Vec::new();
        for chunk in chunks {
            parser
                .feed(chunk, &mut |event| events.push(format!("{event:?}")))
                .unwrap();
        }
        events
    }

    #[test]
    fn test_preamble_is_skipped() {
        let mut parser = MultipartParser::new("xx", &Limits::default());
        let events = collect(
            &mut parser,
            &[b"junk\r\n--xx\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--xx--"],
        );
        assert!(parser.is_finished());
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("\"a\""));
    }

    #[test]
    fn test_garbage_after_boundary_is_rejected() {
        let mut parser = MultipartParser::new("xx", &Limits::default());
        let result = parser.feed(b"--xxZ", &mut |_| {});
        assert!(matches!(result, Err(Error::MalformedMultipart(_))));
    }
}
