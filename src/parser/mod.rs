//! HTTP parser module.
//!
//! This module turns a fragmented byte stream into a request head, query and
//! form parameters, and upload events. Every parser here is resumable: input
//! may be delivered in chunks of any size and the result does not depend on
//! where the chunks were split.

mod body;
mod error;
mod header;
mod limits;
mod method;
mod multipart;
mod param;
mod request;
mod urlencoded;
mod version;
mod tests;

// Re-export public items
pub use body::{BodyEvent, BodyReader};
pub use error::{DecodeError, Error};
pub use header::{Header, Headers};
pub use limits::Limits;
pub use method::{Method, Methods};
pub use multipart::MultipartParser;
pub use param::{Parameter, Params};
pub use request::{Authorization, BodyKind, HeadParser, Progress, RequestHead};
pub use urlencoded::{parse_query, url_decode};
pub use version::HttpVersion;

// Re-export the parse_request function
pub use request::parse_request;
