//! HTTP server implementation.

use std::mem;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::{JoinSet, LocalSet};
use tokio::time::{self, Instant};

use crate::parser::{BodyEvent, HttpVersion, Methods};
use crate::server::config::ServerConfig;
use crate::server::connection::{Connection, Transport, UploadPart};
use crate::server::error::Error;
use crate::server::handler::{
    BodyCallback, BodyChunk, CallbackHandler, Handler, HandlerId, RequestCallback, Route,
    UploadCallback, UploadChunk,
};
use crate::server::request::HttpRequest;
use crate::server::response::{HttpResponse, StatusCode};
use crate::server::rewrite::Rewrite;

/// The handler a request was bound to when its head was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    None,
    /// Index into the route list.
    Route(usize),
    /// The route matched but its credentials did not.
    Unauthorized(usize),
    /// No route matched; the server-wide callbacks apply.
    CatchAll,
}

/// An HTTP server.
///
/// Owns the rewrite and route registries. Registration needs `&mut self`,
/// so it can only happen before the server is serving.
pub struct HttpServer {
    /// The server configuration.
    pub config: ServerConfig,
    routes: Vec<Route>,
    rewrites: Vec<Rewrite>,
    next_id: u32,
    not_found: Option<RequestCallback>,
    catch_all_upload: Option<UploadCallback>,
    catch_all_body: Option<BodyCallback>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            routes: Vec::new(),
            rewrites: Vec::new(),
            next_id: 0,
            not_found: None,
            catch_all_upload: None,
            catch_all_body: None,
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn rewrites(&self) -> &[Rewrite] {
        &self.rewrites
    }

    /// Register a handler after the existing ones.
    pub fn add_handler<H>(&mut self, handler: H) -> &mut Route
    where
        H: Handler + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        let index = self.routes.len();
        self.routes.push(Route::new(id, Box::new(handler)));
        &mut self.routes[index]
    }

    /// Register a closure for `uri` and the given methods.
    pub fn on<F>(&mut self, uri: impl Into<String>, methods: Methods, on_request: F) -> &mut Route
    where
        F: Fn(&mut HttpRequest) + 'static,
    {
        self.add_handler(CallbackHandler::new(uri, methods, on_request))
    }

    /// Register a closure for URLs matching a regular expression.
    pub fn on_regex<F>(&mut self, pattern: &str, methods: Methods, on_request: F) -> Result<&mut Route, Error>
    where
        F: Fn(&mut HttpRequest) + 'static,
    {
        let handler = CallbackHandler::regex(pattern, methods, on_request)?;
        Ok(self.add_handler(handler))
    }

    pub fn route_mut(&mut self, id: HandlerId) -> Option<&mut Route> {
        self.routes.iter_mut().find(|route| route.id() == id)
    }

    /// Unregister a handler. Other handlers keep their identity and order.
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        let before = self.routes.len();
        self.routes.retain(|route| route.id() != id);
        before != self.routes.len()
    }

    pub fn add_rewrite(&mut self, rewrite: Rewrite) -> &mut Rewrite {
        let index = self.rewrites.len();
        self.rewrites.push(rewrite);
        &mut self.rewrites[index]
    }

    /// Rewrite requests for exactly `from` to `to` (which may carry a query).
    pub fn rewrite(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Rewrite {
        self.add_rewrite(Rewrite::new(from, to))
    }

    /// Remove the first rewrite whose source is `from`.
    pub fn remove_rewrite(&mut self, from: &str) -> bool {
        match self.rewrites.iter().position(|r| r.from() == from) {
            Some(index) => {
                self.rewrites.remove(index);
                true
            }
            None => false,
        }
    }

    /// Answer requests no route accepts. Without one, they get `404`.
    pub fn on_not_found<F>(&mut self, callback: F)
    where
        F: Fn(&mut HttpRequest) + 'static,
    {
        self.not_found = Some(Box::new(callback));
    }

    /// Receive uploads sent to URLs no route accepts.
    pub fn on_file_upload<F>(&mut self, callback: F)
    where
        F: Fn(&mut HttpRequest, &UploadChunk<'_>) + 'static,
    {
        self.catch_all_upload = Some(Box::new(callback));
    }

    /// Receive raw bodies sent to URLs no route accepts.
    pub fn on_request_body<F>(&mut self, callback: F)
    where
        F: Fn(&mut HttpRequest, &BodyChunk<'_>) + 'static,
    {
        self.catch_all_body = Some(Box::new(callback));
    }

    /// Drop every rewrite, route and catch-all callback.
    pub fn reset(&mut self) {
        self.routes.clear();
        self.rewrites.clear();
        self.not_found = None;
        self.catch_all_upload = None;
        self.catch_all_body = None;
    }

    /// Start a connection driven by the caller's transport events.
    pub fn connect(&self) -> Connection<'_> {
        Connection::new(self)
    }

    // Dispatch

    /// Apply the first matching rewrite.
    pub(crate) fn rewrite_request(&self, request: &mut HttpRequest) {
        if let Some(rewrite) = self.rewrites.iter().find(|r| r.matches(request)) {
            rewrite.apply(request);
        }
    }

    /// Bind the first route that accepts the request.
    pub(crate) fn attach_handler(&self, request: &mut HttpRequest) -> Binding {
        for (index, route) in self.routes.iter().enumerate() {
            if !route.accepts(request) {
                continue;
            }
            return match route.credentials() {
                Some(credentials) if !credentials.verify(request.head().authorization.as_ref()) => {
                    debug!("Credentials rejected for {}", request.url());
                    Binding::Unauthorized(index)
                }
                _ => Binding::Route(index),
            };
        }
        debug!("No handler for {} {}", request.method(), request.url());
        Binding::CatchAll
    }

    pub(crate) fn handle_body_event(
        &self,
        binding: Binding,
        request: &mut HttpRequest,
        upload: &mut Option<UploadPart>,
        event: BodyEvent<'_>,
    ) {
        match event {
            BodyEvent::Param(param) => request.head.params.push(param),
            BodyEvent::UploadStart {
                name, content_type, ..
            } => {
                *upload = Some(UploadPart {
                    name: name.to_string(),
                    content_type: content_type.to_string(),
                });
            }
            BodyEvent::UploadData {
                filename,
                index,
                data,
            } => self.deliver_upload(binding, request, upload.as_ref(), filename, index, data, false),
            BodyEvent::UploadEnd {
                filename,
                index,
                data,
            } => {
                self.deliver_upload(binding, request, upload.as_ref(), filename, index, data, true);
                *upload = None;
            }
            BodyEvent::Raw { data, index, total } => {
                let chunk = BodyChunk { data, index, total };
                match binding {
                    Binding::Route(i) => self.routes[i].handler.handle_body(request, &chunk),
                    Binding::CatchAll => {
                        if let Some(callback) = &self.catch_all_body {
                            callback(request, &chunk);
                        }
                    }
                    Binding::Unauthorized(_) | Binding::None => {}
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn deliver_upload(
        &self,
        binding: Binding,
        request: &mut HttpRequest,
        part: Option<&UploadPart>,
        filename: &str,
        index: usize,
        data: &[u8],
        is_final: bool,
    ) {
        let chunk = UploadChunk {
            name: part.map_or("", |p| p.name.as_str()),
            filename,
            content_type: part.map_or("", |p| p.content_type.as_str()),
            index,
            data,
            is_final,
        };
        match binding {
            Binding::Route(i) => self.routes[i].handler.handle_upload(request, &chunk),
            Binding::CatchAll => {
                if let Some(callback) = &self.catch_all_upload {
                    callback(request, &chunk);
                }
            }
            Binding::Unauthorized(_) | Binding::None => {}
        }
    }

    /// Run the bound handler, the credential challenge, or the not-found path.
    pub(crate) fn handle_request(&self, binding: Binding, request: &mut HttpRequest) {
        match binding {
            Binding::Route(i) => self.routes[i].handler.handle_request(request),
            Binding::Unauthorized(i) => {
                let realm = self.routes[i].credentials().map(|c| c.realm().to_string());
                request.request_authentication(realm.as_deref());
            }
            Binding::CatchAll | Binding::None => match &self.not_found {
                Some(callback) => callback(request),
                None => request.send_text(
                    StatusCode::NotFound,
                    "text/plain",
                    format!("Not found: {}", request.url()),
                ),
            },
        }
    }

    // TCP adapter

    /// Display the registered endpoints.
    fn display_server_info(&self) {
        info!("Registered endpoints:");
        for route in &self.routes {
            let guard = match route.credentials() {
                Some(credentials) => format!(" (auth: {})", credentials.realm()),
                None => String::new(),
            };
            info!("  {}{guard}", route.handler.describe());
        }
        for rewrite in &self.rewrites {
            info!("  rewrite {} -> {}", rewrite.from(), rewrite.to_url());
        }
    }

    /// Set up the TCP listener.
    async fn setup_listener(&self) -> Result<TcpListener, Error> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        info!("Server listening on http://{addr}", addr = self.config.addr);
        Ok(listener)
    }

    /// Start the server and listen for incoming connections.
    ///
    /// Every connection runs on the current thread, so handlers never run
    /// concurrently with each other. Returns after Ctrl+C once open
    /// connections have finished.
    pub async fn start(self) -> Result<(), Error> {
        LocalSet::new().run_until(self.run()).await
    }

    async fn run(self) -> Result<(), Error> {
        self.display_server_info();
        let listener = self.setup_listener().await?;

        let server = Rc::new(self);
        let semaphore = Arc::new(Semaphore::new(server.config.max_connections));
        let mut tasks = JoinSet::new();

        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    match result {
                        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
                        Err(e) => error!("Error setting up Ctrl+C handler: {e}"),
                    }
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                                warn!("Connection limit reached, rejecting connection from {addr}");
                                Self::reject_at_capacity(socket, &server.config).await;
                                continue;
                            };
                            debug!("Accepted connection from {addr}");
                            let server = Rc::clone(&server);
                            tasks.spawn_local(async move {
                                // The permit is dropped when the task completes, releasing the slot
                                let _permit = permit;
                                if let Err(e) = serve_connection(&server, socket).await {
                                    warn!("Error handling connection from {addr}: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {e}");
                            time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }

        Self::perform_shutdown(&mut tasks).await;
        Ok(())
    }

    async fn reject_at_capacity(mut socket: TcpStream, config: &ServerConfig) {
        let response = HttpResponse::new(StatusCode::ServiceUnavailable)
            .with_content_type("text/plain")
            .with_body_string("Server is at capacity, please try again later");
        let bytes = response.to_bytes(HttpVersion::Http11, &config.default_headers);
        if let Err(e) = socket.write_all(&bytes).await {
            debug!("Could not send 503: {e}");
        }
        if let Err(e) = socket.shutdown().await {
            debug!("Could not shut down rejected connection: {e}");
        }
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(tasks: &mut JoinSet<()>) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = Duration::from_secs(30);
        let drained = time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("Shutdown timed out with {len} connections still open", len = tasks.len());
        }

        info!("Server shutdown complete");
    }
}

/// Send window over a byte stream: bytes are queued until the socket takes
/// them, and a completed write counts as the peer's acknowledgement.
struct StreamTransport {
    window: usize,
    in_flight: usize,
    pending: Vec<u8>,
    closed: bool,
}

impl StreamTransport {
    fn new(window: usize) -> Self {
        Self {
            window,
            in_flight: 0,
            pending: Vec::new(),
            closed: false,
        }
    }
}

impl Transport for StreamTransport {
    fn space(&self) -> usize {
        if self.closed {
            0
        } else {
            self.window.saturating_sub(self.in_flight)
        }
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.space());
        self.pending.extend_from_slice(&data[..n]);
        self.in_flight += n;
        n
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Drive one connection of `server` over an async byte stream.
///
/// Socket reads become `on_data`, timer ticks `on_poll`, completed writes
/// `on_ack`, and I/O failures `on_error`. Read inactivity while the request
/// is arriving and a write stuck longer than `ack_timeout` both become
/// `on_timeout`. The connection always ends with `on_disconnect`.
pub async fn serve_connection<S>(server: &HttpServer, mut stream: S) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = &server.config;
    let mut connection = server.connect();
    let mut transport = StreamTransport::new(config.send_window);
    let mut buf = vec![0u8; config.read_buffer_size];
    let started = Instant::now();
    let elapsed = |now: Instant| u32::try_from(now.duration_since(started).as_millis()).unwrap_or(u32::MAX);

    let mut ticker = time::interval(config.poll_interval);
    let mut deadline = Instant::now() + config.rx_timeout;

    let result = loop {
        if !transport.pending.is_empty() {
            let data = mem::take(&mut transport.pending);
            match time::timeout(config.ack_timeout, stream.write_all(&data)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    connection.on_error(&mut transport, -1);
                    break Err(Error::IoError(e));
                }
                Err(_) => {
                    debug!("Peer stopped accepting data");
                    connection.on_timeout(&mut transport, elapsed(Instant::now()));
                    break Err(Error::Timeout);
                }
            }
            transport.in_flight -= data.len();
            connection.on_ack(&mut transport, data.len(), elapsed(Instant::now()));
            continue;
        }
        if transport.closed {
            break Ok(());
        }

        let receiving = connection.is_receiving();
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("Peer closed the connection");
                    break Ok(());
                }
                Ok(n) => {
                    deadline = Instant::now() + config.rx_timeout;
                    connection.on_data(&mut transport, &buf[..n]);
                }
                Err(e) => {
                    connection.on_error(&mut transport, -1);
                    break Err(Error::IoError(e));
                }
            },
            _ = time::sleep_until(deadline), if receiving => {
                connection.on_timeout(&mut transport, elapsed(Instant::now()));
            }
            _ = ticker.tick() => connection.on_poll(&mut transport),
        }
    };

    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown failed: {e}");
    }
    connection.on_disconnect();
    result
}
