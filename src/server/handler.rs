//! HTTP request handlers and routing.

use std::fmt;

use log::debug;
use regex::Regex;

use crate::parser::Methods;
use crate::server::auth::Credentials;
use crate::server::error::Error;
use crate::server::request::HttpRequest;

/// A run of uploaded file content.
///
/// `index == 0` marks the first chunk of a file; `is_final` marks the last.
/// A zero-byte file produces a single chunk that is both.
#[derive(Debug, Clone, Copy)]
pub struct UploadChunk<'a> {
    /// Form field the file was sent under.
    pub name: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    /// Offset of `data` within the file.
    pub index: usize,
    pub data: &'a [u8],
    pub is_final: bool,
}

/// A run of an opaque request body.
#[derive(Debug, Clone, Copy)]
pub struct BodyChunk<'a> {
    pub data: &'a [u8],
    /// Offset of `data` within the body.
    pub index: usize,
    /// Declared body length.
    pub total: usize,
}

/// Callback producing the response for a request.
pub type RequestCallback = Box<dyn Fn(&mut HttpRequest)>;

/// Callback receiving uploaded file content as it arrives.
pub type UploadCallback = Box<dyn Fn(&mut HttpRequest, &UploadChunk<'_>)>;

/// Callback receiving an opaque request body as it arrives.
pub type BodyCallback = Box<dyn Fn(&mut HttpRequest, &BodyChunk<'_>)>;

/// Predicate deciding whether a route or rewrite applies to a request.
pub type Filter = Box<dyn Fn(&HttpRequest) -> bool>;

/// Something that can answer requests.
///
/// Handlers are consulted in registration order and the first whose
/// [`can_handle`](Handler::can_handle) accepts the request is bound to it.
/// Binding happens as soon as the header block is parsed, so upload and body
/// content can be streamed to the handler before
/// [`handle_request`](Handler::handle_request) runs.
pub trait Handler {
    /// Decide whether to take the request. May record path parameters and
    /// interesting headers on it.
    fn can_handle(&self, request: &mut HttpRequest) -> bool;

    /// Produce the response, usually via [`HttpRequest::send`].
    fn handle_request(&self, request: &mut HttpRequest);

    fn handle_upload(&self, _request: &mut HttpRequest, _chunk: &UploadChunk<'_>) {}

    fn handle_body(&self, _request: &mut HttpRequest, _chunk: &BodyChunk<'_>) {}

    /// Short description for the endpoint listing.
    fn describe(&self) -> String {
        "custom handler".to_string()
    }
}

enum Pattern {
    Any,
    Exact(String),
    Prefix(String),
    Extension(String),
    Regex(Regex),
}

impl Pattern {
    fn parse(uri: &str) -> Self {
        if uri.is_empty() {
            Pattern::Any
        } else if let Some(ext) = uri.strip_prefix("/*") {
            // "/*.ext" matches by extension
            if ext.starts_with('.') {
                Pattern::Extension(ext.to_string())
            } else {
                Pattern::Prefix("/".to_string())
            }
        } else if let Some(prefix) = uri.strip_suffix('*') {
            Pattern::Prefix(prefix.to_string())
        } else {
            Pattern::Exact(uri.to_string())
        }
    }

    fn matches(&self, url: &str, path_params: &mut Vec<String>) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Extension(ext) => url.ends_with(ext.as_str()),
            Pattern::Prefix(prefix) => url.starts_with(prefix.as_str()),
            Pattern::Exact(uri) => {
                url == uri
                    || url
                        .strip_prefix(uri.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Pattern::Regex(re) => match re.captures(url) {
                Some(caps) => {
                    path_params.clear();
                    path_params.extend(
                        caps.iter()
                            .skip(1)
                            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default()),
                    );
                    true
                }
                None => false,
            },
        }
    }
}

/// A handler built from closures and a URL pattern.
///
/// Patterns:
/// - `""` matches every URL
/// - `"/*.ext"` matches URLs ending in `.ext`
/// - `"/prefix*"` matches URLs starting with `/prefix`
/// - `"/path"` matches `/path` and anything below `/path/`
/// - with [`CallbackHandler::regex`], a regular expression whose capture
///   groups become the request's path arguments
pub struct CallbackHandler {
    uri: String,
    pattern: Pattern,
    methods: Methods,
    on_request: Option<RequestCallback>,
    on_upload: Option<UploadCallback>,
    on_body: Option<BodyCallback>,
    headers: Vec<String>,
}

impl CallbackHandler {
    pub fn new<F>(uri: impl Into<String>, methods: Methods, on_request: F) -> Self
    where
        F: Fn(&mut HttpRequest) + 'static,
    {
        let uri = uri.into();
        Self {
            pattern: Pattern::parse(&uri),
            uri,
            methods,
            on_request: Some(Box::new(on_request)),
            on_upload: None,
            on_body: None,
            headers: Vec::new(),
        }
    }

    /// A handler matching URLs against a regular expression.
    ///
    /// The expression is searched for in the URL, so anchor it with `^` and
    /// `$` to match the whole path.
    pub fn regex<F>(pattern: &str, methods: Methods, on_request: F) -> Result<Self, Error>
    where
        F: Fn(&mut HttpRequest) + 'static,
    {
        let regex = Regex::new(pattern)?;
        let mut handler = Self::new(pattern, methods, on_request);
        handler.pattern = Pattern::Regex(regex);
        Ok(handler)
    }

    pub fn with_upload<F>(mut self, on_upload: F) -> Self
    where
        F: Fn(&mut HttpRequest, &UploadChunk<'_>) + 'static,
    {
        self.on_upload = Some(Box::new(on_upload));
        self
    }

    pub fn with_body<F>(mut self, on_body: F) -> Self
    where
        F: Fn(&mut HttpRequest, &BodyChunk<'_>) + 'static,
    {
        self.on_body = Some(Box::new(on_body));
        self
    }

    /// Keep this request header on requests the handler accepts.
    pub fn with_header_interest(mut self, name: impl Into<String>) -> Self {
        self.headers.push(name.into());
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn methods(&self) -> Methods {
        self.methods
    }
}

impl Handler for CallbackHandler {
    fn can_handle(&self, request: &mut HttpRequest) -> bool {
        if self.on_request.is_none() || !self.methods.contains(request.method()) {
            return false;
        }
        let url = request.url().to_string();
        if !self.pattern.matches(&url, &mut request.path_params) {
            return false;
        }
        for name in &self.headers {
            request.add_interesting_header(name.clone());
        }
        debug!("{} {url} matched '{}'", request.method(), self.uri);
        true
    }

    fn handle_request(&self, request: &mut HttpRequest) {
        if let Some(callback) = &self.on_request {
            callback(request);
        }
    }

    fn handle_upload(&self, request: &mut HttpRequest, chunk: &UploadChunk<'_>) {
        if let Some(callback) = &self.on_upload {
            callback(request, chunk);
        }
    }

    fn handle_body(&self, request: &mut HttpRequest, chunk: &BodyChunk<'_>) {
        if let Some(callback) = &self.on_body {
            callback(request, chunk);
        }
    }

    fn describe(&self) -> String {
        let uri = if self.uri.is_empty() { "*" } else { &self.uri };
        format!("{} {uri}", self.methods)
    }
}

/// Opaque, stable identity of a registered route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u32);

/// A registered handler with its guards.
pub struct Route {
    id: HandlerId,
    pub(crate) handler: Box<dyn Handler>,
    filter: Option<Filter>,
    credentials: Option<Credentials>,
}

impl Route {
    pub(crate) fn new(id: HandlerId, handler: Box<dyn Handler>) -> Self {
        Self {
            id,
            handler,
            filter: None,
            credentials: None,
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Only consider this route for requests `filter` accepts.
    pub fn set_filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&HttpRequest) -> bool + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Require Basic credentials. An empty username or password disables the check.
    pub fn set_authentication(
        &mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> &mut Self {
        let credentials = Credentials::new(username, password);
        self.credentials = if credentials.username.is_empty() || credentials.password.is_empty() {
            None
        } else {
            Some(credentials)
        };
        self
    }

    pub fn set_credentials(&mut self, credentials: Credentials) -> &mut Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub(crate) fn accepts(&self, request: &mut HttpRequest) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(request))
            && self.handler.can_handle(request)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("handler", &self.handler.describe())
            .field("filtered", &self.filter.is_some())
            .field("credentials", &self.credentials.as_ref().map(|c| &c.username))
            .finish()
    }
}
