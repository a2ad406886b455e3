//! Per-request context.
//!
//! # Data Flow
//! ```text
//! Buffered request (parts + body bytes + peer address)
//!     → RequestContext::from_request (fresh per request, never pooled)
//!     → locals populated (decoded body, route params)
//!     → plugins and the terminal handler read it and write the response
//!     → http::response turns the finalized state into a wire response
//! ```
//!
//! # Design Decisions
//! - Read surface is immutable request data plus the `locals` scratch map
//! - Write surface (response.rs) is a set of explicit send operations
//! - Cookies and query are parsed lazily, once

pub mod cookies;
pub mod locals;
pub mod render;
pub mod response;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, Request};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use locals::{Locals, Params};
pub use render::{Render, Template};
pub use response::{Charset, Finalized, Payload, ResponseError, ResponseState};

static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// One request/response pair.
#[derive(Debug)]
pub struct RequestContext {
    id: ContextId,
    method: Method,
    url: String,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    raw_body: Bytes,
    cookies: OnceLock<HashMap<String, String>>,
    query: OnceLock<HashMap<String, String>>,
    locals: Locals,
    response: ResponseState,
}

impl RequestContext {
    /// Build a context from a fully buffered request.
    pub fn from_request(request: Request<Bytes>, peer: Option<SocketAddr>) -> Self {
        let (parts, raw_body) = request.into_parts();
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut locals = Locals::default();
        if !raw_body.is_empty() {
            locals.body = Some(String::from_utf8_lossy(&raw_body).into_owned());
        }

        let id = ContextId::next();
        Self {
            id,
            method: parts.method,
            url,
            headers: parts.headers,
            peer,
            raw_body,
            cookies: OnceLock::new(),
            query: OnceLock::new(),
            locals,
            response: ResponseState::new(id),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path plus query, as sent by the client.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path without the query.
    pub fn clean_url(&self) -> &str {
        crate::routing::pattern::strip_query(&self.url)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request header lookup (case-insensitive). Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies.get_or_init(|| {
            self.header(header::COOKIE.as_str())
                .map(cookies::parse_cookie_header)
                .unwrap_or_default()
        })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    /// Flat query map. A repeated key keeps its last value.
    pub fn query(&self) -> &HashMap<String, String> {
        self.query.get_or_init(|| match self.url.split_once('?') {
            Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            None => HashMap::new(),
        })
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query().get(name).map(String::as_str)
    }

    /// Client address: first `x-forwarded-for` entry, else the peer address.
    pub fn ip(&self) -> Option<String> {
        self.header("x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| self.peer.map(|addr| addr.ip().to_string()))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST.as_str())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT.as_str())
    }

    pub fn referer(&self) -> Option<&str> {
        self.header(header::REFERER.as_str())
    }

    pub fn age(&self) -> Option<&str> {
        self.header(header::AGE.as_str())
    }

    /// The `via` header.
    pub fn proxy(&self) -> Option<&str> {
        self.header(header::VIA.as_str())
    }

    /// Request content-length, 0 when absent or malformed.
    pub fn length(&self) -> u64 {
        self.header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Buffered request body as text.
    pub fn body(&self) -> Option<&str> {
        self.locals.body.as_deref()
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Request body parsed as JSON. An absent or unparsable body reads as `{}`.
    pub fn body_json(&self) -> Value {
        self.locals
            .body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// Request body deserialized into `T`, if it parses.
    pub fn body_json_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.locals
            .body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }

    pub fn params(&self) -> &Params {
        &self.locals.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.locals.params.get(name)
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut Locals {
        &mut self.locals
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.locals.params = params;
    }

    /// Response state, for inspection.
    pub fn response(&self) -> &ResponseState {
        &self.response
    }

    pub(crate) fn response_mut(&mut self) -> &mut ResponseState {
        &mut self.response
    }

    pub(crate) fn into_response_state(self) -> ResponseState {
        self.response
    }
}

#[cfg(test)]
pub(crate) fn test_context(method: Method, uri: &str, headers: &[(&str, &str)], body: &str) -> RequestContext {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Bytes::from(body.to_string())).unwrap();
    RequestContext::from_request(request, Some("10.0.0.9:5555".parse().unwrap()))
}
