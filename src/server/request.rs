//! The request as seen by handlers.

use std::any::Any;
use std::fmt;

use log::{debug, warn};

use crate::parser::{Authorization, Header, Headers, HttpVersion, Method, Parameter, Params, RequestHead};
use crate::server::auth::{basic_challenge, basic_token, DEFAULT_REALM};
use crate::server::response::{HttpResponse, StatusCode};

/// An HTTP request bound to one connection.
///
/// Owns the parsed head, the path arguments captured by the matching route,
/// and at most one response. Handlers reply with [`send`](Self::send) or one
/// of its shortcuts; the response is emitted once the request body has been
/// fully received.
pub struct HttpRequest {
    pub(crate) head: RequestHead,
    pub(crate) path_params: Vec<String>,
    pub(crate) response: Option<HttpResponse>,
    interesting: Vec<String>,
    user_data: Option<Box<dyn Any>>,
    disconnect: Option<Box<dyn FnOnce()>>,
}

impl HttpRequest {
    pub(crate) fn new() -> Self {
        Self::from_head(RequestHead::default())
    }

    /// A request around an already parsed head, not tied to any connection.
    pub fn from_head(head: RequestHead) -> Self {
        Self {
            head,
            path_params: Vec::new(),
            response: None,
            interesting: Vec::new(),
            user_data: None,
            disconnect: None,
        }
    }

    pub fn method(&self) -> Method {
        self.head.method
    }

    /// The decoded path, without the query string.
    pub fn url(&self) -> &str {
        &self.head.url
    }

    pub fn version(&self) -> HttpVersion {
        self.head.version
    }

    pub fn host(&self) -> Option<&str> {
        self.head.host.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.head.content_type.as_deref()
    }

    pub fn content_length(&self) -> usize {
        self.head.content_length
    }

    pub fn is_multipart(&self) -> bool {
        self.head.is_multipart()
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    // Parameters

    /// Value of the first parameter with this name, from the query or body.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.head.params.value(name)
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.head.params.get(name).is_some()
    }

    /// First parameter with this name and origin.
    pub fn param(&self, name: &str, from_body: bool, is_file: bool) -> Option<&Parameter> {
        self.head.params.find(name, from_body, is_file)
    }

    pub fn param_at(&self, index: usize) -> Option<&Parameter> {
        self.head.params.get_index(index)
    }

    pub fn params(&self) -> &Params {
        &self.head.params
    }

    /// Capture group `index` of the route's regular expression.
    pub fn path_arg(&self, index: usize) -> Option<&str> {
        self.path_params.get(index).map(String::as_str)
    }

    pub fn path_args(&self) -> &[String] {
        &self.path_params
    }

    // Headers

    pub fn header(&self, name: &str) -> Option<&Header> {
        self.head.headers.get(name)
    }

    pub fn header_at(&self, index: usize) -> Option<&Header> {
        self.head.headers.get_index(index)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.head.headers.contains(name)
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    /// Keep this header past the end of header parsing.
    ///
    /// Only effective while a handler is being selected; afterwards the
    /// headers nobody asked for are gone.
    pub fn add_interesting_header(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.interesting.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            self.interesting.push(name);
        }
    }

    /// Drop headers that are neither parser-interpreted nor asked for.
    pub(crate) fn remove_uninteresting_headers(&mut self, configured: &[String]) {
        if configured.iter().chain(self.interesting.iter()).any(|n| n == "*") {
            return;
        }
        let interesting = &self.interesting;
        let before = self.head.headers.len();
        self.head.headers.retain(|header| {
            let name = header.name();
            RequestHead::is_special_header(name)
                || configured
                    .iter()
                    .chain(interesting.iter())
                    .any(|n| n.eq_ignore_ascii_case(name))
        });
        let dropped = before - self.head.headers.len();
        if dropped > 0 {
            debug!("Dropped {dropped} uninteresting headers");
        }
    }

    // Authentication

    /// Check Basic credentials against the `Authorization` header.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.authenticate_hash(&basic_token(username, password))
    }

    /// Check a precomputed Basic token (base64 of `user:pass`).
    pub fn authenticate_hash(&self, token: &str) -> bool {
        match &self.head.authorization {
            Some(Authorization::Basic(sent)) => sent == token,
            Some(Authorization::Digest(_)) => {
                debug!("Digest credentials are not verified");
                false
            }
            None => false,
        }
    }

    /// Reply `401` with a Basic challenge for `realm`.
    pub fn request_authentication(&mut self, realm: Option<&str>) {
        let realm = realm.unwrap_or(DEFAULT_REALM);
        self.send(
            HttpResponse::new(StatusCode::Unauthorized)
                .with_header("WWW-Authenticate", basic_challenge(realm)),
        );
    }

    // Responding

    /// Set the response. Replaces an earlier one that has not started yet.
    pub fn send(&mut self, response: HttpResponse) {
        if let Some(current) = &self.response {
            if current.is_started() {
                warn!("Response already started, ignoring {}", response.status());
                return;
            }
        }
        self.response = Some(response);
    }

    pub fn send_status(&mut self, status: StatusCode) {
        self.send(HttpResponse::new(status));
    }

    pub fn send_text(&mut self, status: StatusCode, content_type: &str, body: impl Into<String>) {
        self.send(
            HttpResponse::new(status)
                .with_content_type(content_type)
                .with_body_string(body),
        );
    }

    /// Reply `302 Found` pointing at `url`.
    pub fn redirect(&mut self, url: impl Into<String>) {
        self.send(HttpResponse::redirect(url));
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    // Per-request state

    /// Attach a value, replacing any earlier one.
    pub fn set_user_data<T: Any>(&mut self, value: T) {
        self.user_data = Some(Box::new(value));
    }

    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_mut()?.downcast_mut()
    }

    pub fn take_user_data<T: Any>(&mut self) -> Option<T> {
        match self.user_data.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.user_data = Some(other);
                None
            }
        }
    }

    /// Run `callback` when the connection goes away.
    pub fn on_disconnect<F>(&mut self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.disconnect = Some(Box::new(callback));
    }

    pub(crate) fn fire_disconnect(&mut self) {
        if let Some(callback) = self.disconnect.take() {
            callback();
        }
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("head", &self.head)
            .field("path_params", &self.path_params)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_request;

    fn request(raw: &[u8]) -> HttpRequest {
        HttpRequest::from_head(parse_request(raw).unwrap())
    }

    #[test]
    fn test_args_and_absence() {
        let req = request(b"GET /q?a=1&empty=&a=2 HTTP/1.1\r\n\r\n");
        assert_eq!(req.arg("a"), Some("1"));
        assert_eq!(req.arg("empty"), Some(""));
        assert_eq!(req.arg("missing"), None);
        assert!(req.has_arg("empty"));
        assert_eq!(req.param_at(2).map(Parameter::value), Some("2"));
        assert!(req.param("a", true, false).is_none());
        assert!(req.param("a", false, false).is_some());
    }

    #[test]
    fn test_uninteresting_headers_removed() {
        let mut req = request(
            b"GET / HTTP/1.1\r\nHost: h\r\nX-Trace: 1\r\nCookie: c\r\nUser-Agent: u\r\n\r\n",
        );
        req.add_interesting_header("cookie");
        req.remove_uninteresting_headers(&["User-Agent".to_string()]);
        assert!(req.has_header("Host"));
        assert!(req.has_header("Cookie"));
        assert!(req.has_header("user-agent"));
        assert!(!req.has_header("X-Trace"));
    }

    #[test]
    fn test_wildcard_keeps_everything() {
        let mut req = request(b"GET / HTTP/1.1\r\nX-One: 1\r\nX-Two: 2\r\n\r\n");
        req.remove_uninteresting_headers(&["*".to_string()]);
        assert_eq!(req.headers().len(), 2);
    }

    #[test]
    fn test_authenticate() {
        let token = basic_token("admin", "pw");
        let raw = format!("GET / HTTP/1.1\r\nAuthorization: Basic {token}\r\n\r\n");
        let req = request(raw.as_bytes());
        assert!(req.authenticate("admin", "pw"));
        assert!(!req.authenticate("admin", "nope"));
        assert!(req.authenticate_hash(&token));
    }

    #[test]
    fn test_user_data() {
        let mut req = HttpRequest::new();
        assert!(req.user_data_mut::<u32>().is_none());
        req.set_user_data(5u32);
        *req.user_data_mut::<u32>().unwrap() += 1;
        assert!(req.take_user_data::<String>().is_none());
        assert_eq!(req.take_user_data::<u32>(), Some(6));
    }

    #[test]
    fn test_send_replaces_unstarted_response() {
        let mut req = HttpRequest::new();
        req.send_status(StatusCode::Accepted);
        req.send_text(StatusCode::Ok, "text/plain", "done");
        assert_eq!(req.response().map(HttpResponse::status), Some(StatusCode::Ok));
    }
}
