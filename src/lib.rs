//! An event-driven HTTP server engine for small devices.
//!
//! This library turns a fragmented byte stream into HTTP requests, routes
//! them to handlers and streams responses back under acknowledgement-driven
//! flow control, without ever blocking.
//!
//! # Features
//!
//! - Resumable parsing of the request line, headers, URL-encoded forms and
//!   `multipart/form-data` uploads, for input split at any byte
//! - Uploads streamed to handlers in bounded chunks
//! - Route patterns (exact, prefix, extension, regular expression), method
//!   masks, rewrites, filters and Basic authentication
//! - Declared-length, chunked, callback-filled and templated responses
//! - A tokio TCP adapter, or any transport of your own via [`server::Transport`]
//!
//! # Examples
//!
//! ## Parsing a request head
//!
//! ```
//! use asyncweb_rs::parse_request;
//!
//! let request_bytes = b"GET /form?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n";
//!
//! match parse_request(request_bytes) {
//!     Ok(head) => {
//!         println!("Method: {}", head.method);
//!         println!("Path: {}", head.url);
//!         println!("x = {:?}", head.params.value("x"));
//!     }
//!     Err(err) => {
//!         println!("Error parsing request: {}", err);
//!     }
//! }
//! ```
//!
//! ## Error handling
//!
//! ```
//! use asyncweb_rs::{parse_request, ParserError, StatusCode};
//!
//! let invalid_request = b"BREW /pot HTTP/1.1\r\nHost: example.com\r\n\r\n";
//!
//! match parse_request(invalid_request) {
//!     Ok(_) => println!("Request parsed successfully"),
//!     Err(err @ ParserError::UnsupportedMethod(_)) => {
//!         assert_eq!(StatusCode::from(&err), StatusCode::NotImplemented);
//!     }
//!     Err(err) => println!("Other error: {}", err),
//! }
//! ```
//!
//! ## Serving
//!
//! ```no_run
//! use asyncweb_rs::{HttpServer, Methods, ServerConfig, StatusCode};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), asyncweb_rs::ServerError> {
//!     let mut server = HttpServer::new(ServerConfig::default());
//!     server.on("/hello", Methods::GET, |req| {
//!         let name = req.arg("name").unwrap_or("world").to_string();
//!         req.send_text(StatusCode::Ok, "text/plain", format!("Hello, {name}!"));
//!     });
//!     server.start().await
//! }
//! ```
//!
//! See the `demos` directory for a complete server.

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{parse_request, Error as ParserError, HttpVersion, Method, Methods};
pub use server::{
    Error as ServerError, HttpRequest, HttpResponse, HttpServer, ServerConfig, StatusCode,
};
