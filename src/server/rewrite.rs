//! URL rewrites applied before handler selection.

use std::fmt;

use log::{debug, warn};

use crate::parser::parse_query;
use crate::server::handler::Filter;
use crate::server::request::HttpRequest;

/// Maps an exact source path to another path, optionally adding query
/// parameters.
pub struct Rewrite {
    from: String,
    to_url: String,
    params: String,
    filter: Option<Filter>,
}

impl Rewrite {
    /// `to` may carry a query string; its pairs are added to the request.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let to = to.into();
        let (to_url, params) = match to.split_once('?') {
            Some((url, params)) => (url.to_string(), params.to_string()),
            None => (to, String::new()),
        };
        Self {
            from: from.into(),
            to_url,
            params,
            filter: None,
        }
    }

    pub fn set_filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&HttpRequest) -> bool + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to_url(&self) -> &str {
        &self.to_url
    }

    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn matches(&self, request: &HttpRequest) -> bool {
        request.url() == self.from && self.filter.as_ref().map_or(true, |filter| filter(request))
    }

    pub(crate) fn apply(&self, request: &mut HttpRequest) {
        debug!("Rewriting {} to {}", request.url(), self.to_url);
        request.head.url = self.to_url.clone();
        if self.params.is_empty() {
            return;
        }
        match parse_query(&self.params, false) {
            Ok(params) => request.head.params.extend(params),
            Err(e) => warn!("Ignoring parameters of rewrite to {}: {e}", self.to_url),
        }
    }
}

impl fmt::Debug for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rewrite")
            .field("from", &self.from)
            .field("to_url", &self.to_url)
            .field("params", &self.params)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}
