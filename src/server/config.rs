//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::parser::{Headers, Limits};

/// HTTP server configuration.
///
/// Handed to [`HttpServer::new`](crate::server::HttpServer::new) and treated
/// as read-only once the server is serving.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The read buffer size.
    pub read_buffer_size: usize,
    /// Parser limits applied to every request.
    pub limits: Limits,
    /// Request headers kept after parsing, besides the ones the parser
    /// interprets itself. `"*"` keeps all of them.
    pub interesting_headers: Vec<String>,
    /// Headers added to every response.
    pub default_headers: Headers,
    /// Bytes the TCP adapter accepts before waiting for an acknowledgement.
    pub send_window: usize,
    /// How often an idle connection gets a writable opportunity.
    pub poll_interval: Duration,
    /// Close a connection that sends nothing for this long.
    pub rx_timeout: Duration,
    /// Fail a response whose peer takes longer than this to accept a write.
    pub ack_timeout: Duration,
}

impl ServerConfig {
    /// Add a header sent with every response.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.add(name, value);
        self
    }

    /// Keep a request header that would otherwise be dropped.
    pub fn with_interesting_header(mut self, name: impl Into<String>) -> Self {
        self.interesting_headers.push(name.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            limits: Limits::default(),
            interesting_headers: Vec::new(),
            default_headers: Headers::new(),
            send_window: 5744,
            poll_interval: Duration::from_millis(500),
            rx_timeout: Duration::from_secs(3),
            ack_timeout: Duration::from_secs(5),
        }
    }
}
