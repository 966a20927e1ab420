//! HTTP server implementation for asyncweb-rs.
//!
//! This module binds the parsers to a connection lifecycle: handler and
//! rewrite registries, the per-connection event machine, and the response
//! emitter. [`Connection`] can be driven by any non-blocking transport;
//! [`HttpServer::start`] and [`serve_connection`] drive it from tokio.

mod auth;
mod config;
mod connection;
mod error;
mod handler;
mod http_server;
mod request;
mod response;
mod rewrite;
mod template;

// Re-export public items
pub use auth::Credentials;
pub use config::ServerConfig;
pub use connection::{Connection, RequestState, Transport};
pub use error::Error;
pub use handler::{
    BodyCallback, BodyChunk, CallbackHandler, Filter, Handler, HandlerId, RequestCallback, Route,
    UploadCallback, UploadChunk,
};
pub use http_server::{serve_connection, HttpServer};
pub use request::HttpRequest;
pub use response::{ContentSource, Fill, HttpResponse, ResponseState, ResponseStream, StatusCode};
pub use rewrite::Rewrite;
pub use template::TemplateProcessor;
