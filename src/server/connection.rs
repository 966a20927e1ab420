//! Per-connection request lifecycle driven by transport events.
//!
//! A [`Connection`] reacts to the six notifications a non-blocking transport
//! delivers (data, poll, ack, error, timeout, disconnect). Every reaction
//! runs to completion synchronously; the only way work is deferred is by
//! returning and waiting for the next notification.

use log::{debug, warn};

use crate::parser::{BodyEvent, BodyKind, BodyReader, Error as ParserError, HeadParser, Method, Progress};
use crate::server::error::Error;
use crate::server::http_server::{Binding, HttpServer};
use crate::server::request::HttpRequest;
use crate::server::response::{HttpResponse, StatusCode};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// The outgoing half of a connection.
pub trait Transport {
    /// Bytes that can be written right now without blocking.
    fn space(&self) -> usize;

    /// Queue bytes for sending. Returns how many were accepted, never more
    /// than [`space`](Transport::space).
    fn write(&mut self, data: &[u8]) -> usize;

    /// Close once queued bytes are out.
    fn close(&mut self);
}

/// Where a connection's request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    ParsingHeaders,
    ParsingBody,
    Dispatched,
    Responding,
    Completed,
    Failed,
    Closed,
}

/// The file part currently being uploaded.
#[derive(Debug)]
pub(crate) struct UploadPart {
    pub(crate) name: String,
    pub(crate) content_type: String,
}

/// One connection's single in-flight request.
pub struct Connection<'s> {
    server: &'s HttpServer,
    request: HttpRequest,
    state: RequestState,
    head_parser: HeadParser,
    body_reader: Option<BodyReader>,
    binding: Binding,
    upload: Option<UploadPart>,
    /// Interim `100 Continue` bytes not yet accepted by the transport.
    interim: Vec<u8>,
    /// Interim bytes written but not yet acknowledged.
    interim_unacked: usize,
}

impl<'s> Connection<'s> {
    pub(crate) fn new(server: &'s HttpServer) -> Self {
        Self {
            server,
            request: HttpRequest::new(),
            state: RequestState::ParsingHeaders,
            head_parser: HeadParser::new(server.config.limits),
            body_reader: None,
            binding: Binding::None,
            upload: None,
            interim: Vec::new(),
            interim_unacked: 0,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Whether the request is still arriving.
    pub fn is_receiving(&self) -> bool {
        matches!(
            self.state,
            RequestState::ParsingHeaders | RequestState::ParsingBody
        )
    }

    /// Whether nothing more will be sent on this connection.
    pub fn is_done(&self) -> bool {
        matches!(
            self.state,
            RequestState::Completed | RequestState::Failed | RequestState::Closed
        )
    }

    /// Bytes arrived from the peer.
    pub fn on_data(&mut self, transport: &mut dyn Transport, data: &[u8]) {
        match self.state {
            RequestState::ParsingHeaders => {
                let consumed = match self.head_parser.feed(data) {
                    Ok(Progress::Partial) => return,
                    Ok(Progress::Complete(consumed)) => consumed,
                    Err(e) => return self.reject(transport, &e),
                };
                self.complete_head(transport);
                if self.state == RequestState::ParsingBody && consumed < data.len() {
                    self.feed_body(transport, &data[consumed..]);
                } else if consumed < data.len() {
                    self.discard(data.len() - consumed);
                }
            }
            RequestState::ParsingBody => self.feed_body(transport, data),
            _ => self.discard(data.len()),
        }
    }

    /// The transport can take more bytes.
    pub fn on_poll(&mut self, transport: &mut dyn Transport) {
        self.drive(transport);
    }

    /// The peer acknowledged `len` bytes.
    pub fn on_ack(&mut self, transport: &mut dyn Transport, len: usize, _time: u32) {
        let interim = len.min(self.interim_unacked);
        self.interim_unacked -= interim;
        if let Some(response) = self.request.response.as_mut() {
            response.ack(len - interim);
        }
        self.drive(transport);
    }

    pub fn on_error(&mut self, transport: &mut dyn Transport, code: i8) {
        if self.is_done() {
            return;
        }
        self.fail(transport, Error::Transport(code));
    }

    pub fn on_timeout(&mut self, transport: &mut dyn Transport, time: u32) {
        if self.is_done() {
            return;
        }
        debug!("Timed out at {time} ms in state {:?}", self.state);
        self.fail(transport, Error::Timeout);
    }

    /// The connection is gone. Safe to call more than once; the request's
    /// disconnect callback runs exactly once.
    pub fn on_disconnect(&mut self) {
        if self.state == RequestState::Closed {
            return;
        }
        if let Some(upload) = self.upload.take() {
            debug!("Upload of field '{}' aborted by disconnect", upload.name);
        }
        self.body_reader = None;
        self.request.response = None;
        self.state = RequestState::Closed;
        self.request.fire_disconnect();
    }

    fn discard(&self, len: usize) {
        debug!("Ignoring {len} bytes received in state {:?}", self.state);
    }

    fn complete_head(&mut self, transport: &mut dyn Transport) {
        self.request.head = self.head_parser.take_head();
        let server = self.server;
        server.rewrite_request(&mut self.request);
        self.binding = server.attach_handler(&mut self.request);
        self.request
            .remove_uninteresting_headers(&server.config.interesting_headers);

        if self.request.content_length() == 0 {
            return self.dispatch(transport);
        }

        let kind = self.request.head.body_kind();
        if kind == BodyKind::Empty {
            return self.dispatch(transport);
        }
        let reader = match BodyReader::new(&kind, self.request.content_length(), &server.config.limits) {
            Ok(reader) => reader,
            Err(e) => return self.reject(transport, &e),
        };
        self.body_reader = Some(reader);
        self.state = RequestState::ParsingBody;

        if self.request.head.expect_continue {
            self.interim.extend_from_slice(CONTINUE);
            self.drain_interim(transport);
        }
    }

    fn feed_body(&mut self, transport: &mut dyn Transport, data: &[u8]) {
        let Some(mut reader) = self.body_reader.take() else {
            return;
        };
        let server = self.server;
        let binding = self.binding;
        let request = &mut self.request;
        let upload = &mut self.upload;
        let result = reader.feed(data, &mut |event: BodyEvent<'_>| {
            server.handle_body_event(binding, request, upload, event);
        });
        match result {
            Ok(Progress::Partial) => self.body_reader = Some(reader),
            Ok(Progress::Complete(_)) => self.dispatch(transport),
            Err(e) => self.reject(transport, &e),
        }
    }

    fn dispatch(&mut self, transport: &mut dyn Transport) {
        self.state = RequestState::Dispatched;
        self.server.handle_request(self.binding, &mut self.request);
        if !self.request.has_response() {
            warn!("No response for {} {}", self.request.method(), self.request.url());
            self.request.send_status(StatusCode::InternalServerError);
        }
        self.state = RequestState::Responding;
        self.drive(transport);
    }

    /// Answer a request the parser gave up on, then close.
    fn reject(&mut self, transport: &mut dyn Transport, err: &ParserError) {
        let status = StatusCode::from(err);
        warn!("Rejecting request with {status}: {err}");
        if self.state == RequestState::ParsingHeaders {
            if let Some(version) = self.head_parser.version() {
                self.request.head.version = version;
            }
        }
        self.body_reader = None;
        self.upload = None;
        self.request.response = Some(
            HttpResponse::new(status)
                .with_content_type("text/plain")
                .with_body_string(status.reason_phrase()),
        );
        self.state = RequestState::Responding;
        self.drive(transport);
    }

    fn fail(&mut self, transport: &mut dyn Transport, err: Error) {
        warn!(
            "Connection failed in state {:?} for {}: {err}",
            self.state,
            self.request.url()
        );
        if let Some(response) = self.request.response.as_mut() {
            response.fail();
        }
        self.body_reader = None;
        self.state = RequestState::Failed;
        transport.close();
    }

    fn drain_interim(&mut self, transport: &mut dyn Transport) {
        if self.interim.is_empty() {
            return;
        }
        let n = transport.space().min(self.interim.len());
        if n == 0 {
            return;
        }
        let accepted = transport.write(&self.interim[..n]).min(n);
        self.interim.drain(..accepted);
        self.interim_unacked += accepted;
    }

    /// Push the response forward as far as the transport allows.
    fn drive(&mut self, transport: &mut dyn Transport) {
        self.drain_interim(transport);
        if self.state != RequestState::Responding || !self.interim.is_empty() {
            return;
        }

        let version = self.request.version();
        let head_only = self.request.method() == Method::HEAD;
        let server = self.server;
        let defaults = &server.config.default_headers;
        let Some(response) = self.request.response.as_mut() else {
            return;
        };

        let result = if response.is_started() {
            response.pump(transport)
        } else {
            response.respond(version, head_only, defaults, transport)
        };
        if let Err(e) = result {
            warn!("Response failed: {e}");
        }

        if response.is_finished() {
            let failed = response.is_failed();
            debug!(
                "Response {} finished after {} bytes",
                response.status(),
                response.written_len()
            );
            self.state = if failed {
                RequestState::Failed
            } else {
                RequestState::Completed
            };
            transport.close();
        }
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        self.on_disconnect();
    }
}
