//! Response write surface.
//!
//! # Responsibilities
//! - Hold the outgoing status, headers and charset hint
//! - Finalize the response exactly once, minting a [`Finalized`] token
//! - Provide the send sugar (`text`, `html`, `json`, `render`, `redirect`, `end`, `abort`)
//!
//! # Design Decisions
//! - Header writes replace by name, never duplicate (Set-Cookie is the one list)
//! - Every write after finalize is ignored and logged, never an error on the pipeline
//! - `try_send` is the one primitive that reports a repeated finalize to the caller
//! - Content-Length always equals the bytes that will be written

use std::fmt;
use std::sync::Mutex;

use axum::body::Bytes;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::context::cookies::format_set_cookie;
use crate::context::render::Render;
use crate::context::{ContextId, RequestContext};
use crate::dispatch::{BoxError, HandlerError};

const JSON: &str = "application/json; charset=utf-8";
const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

/// Proof that a response was finalized, naming the context that did it.
///
/// Only the send operations of a [`RequestContext`] can create one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finalized {
    context: ContextId,
}

impl Finalized {
    pub fn context(&self) -> ContextId {
        self.context
    }
}

/// Errors from the write surface.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response already finalized")]
    AlreadyFinalized,

    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    #[error("invalid value for header `{name}`")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: header::InvalidHeaderValue,
    },

    #[error("failed to serialize JSON body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to render template: {0}")]
    Render(BoxError),
}

/// Response character encoding hint, used when turning text into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    /// One byte per char; chars above U+00FF become `?`.
    Latin1,
}

impl Charset {
    pub fn encode(&self, text: String) -> Bytes {
        match self {
            Charset::Utf8 => Bytes::from(text),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect::<Vec<u8>>()
                .into(),
        }
    }
}

/// Something a response body can be made from.
pub enum Payload {
    Text(String),
    Bytes(Bytes),
    /// Lazily produced bytes, written as they arrive.
    Stream(BoxStream<'static, Result<Bytes, BoxError>>),
}

impl Payload {
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        Payload::Stream(stream.boxed())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Payload::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Body stored at finalize time.
pub enum SentBody {
    Full(Bytes),
    // Mutex keeps the context `Sync`; the stream is only taken out once.
    Stream(Mutex<BoxStream<'static, Result<Bytes, BoxError>>>),
}

impl fmt::Debug for SentBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentBody::Full(bytes) => f.debug_tuple("Full").field(bytes).finish(),
            SentBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct ResponseState {
    context: ContextId,
    status: Option<StatusCode>,
    headers: HeaderMap,
    charset: Charset,
    body: Option<SentBody>,
    finalized: Option<Finalized>,
}

impl ResponseState {
    pub(crate) fn new(context: ContextId) -> Self {
        Self {
            context,
            status: None,
            headers: HeaderMap::new(),
            charset: Charset::default(),
            body: None,
            finalized: None,
        }
    }

    /// Effective status: the explicit one, else 200.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Status only if a handler set one.
    pub fn explicit_status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    pub fn finalized(&self) -> Option<Finalized> {
        self.finalized
    }

    /// Bytes of a finalized, non-streaming body.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Some(SentBody::Full(bytes)) => Some(&bytes[..]),
            _ => None,
        }
    }

    pub(crate) fn into_parts(self) -> (StatusCode, HeaderMap, Option<SentBody>) {
        let status = self.status();
        (status, self.headers, self.body)
    }

    fn set_status(&mut self, status: StatusCode) {
        if self.is_finalized() {
            tracing::debug!(context = %self.context, %status, "Status write after finalize ignored");
            return;
        }
        self.status = Some(status);
    }

    fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        if self.is_finalized() {
            tracing::debug!(context = %self.context, header = %name, "Header write after finalize ignored");
            return;
        }
        self.headers.insert(name, value);
    }

    fn finalize(&mut self, payload: Payload) -> Result<Finalized, ResponseError> {
        if self.is_finalized() {
            return Err(ResponseError::AlreadyFinalized);
        }

        let body = match payload {
            Payload::Text(text) => SentBody::Full(self.charset.encode(text)),
            Payload::Bytes(bytes) => SentBody::Full(bytes),
            Payload::Stream(stream) => SentBody::Stream(Mutex::new(stream)),
        };

        match &body {
            SentBody::Full(bytes) => {
                self.headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            }
            // Length unknown until drained; a stale declared length would truncate the stream.
            SentBody::Stream(_) => {
                self.headers.remove(header::CONTENT_LENGTH);
            }
        }
        self.headers
            .insert(header::CONNECTION, HeaderValue::from_static("close"));

        let token = Finalized {
            context: self.context,
        };
        self.body = Some(body);
        self.finalized = Some(token);

        tracing::trace!(context = %self.context, status = %self.status(), "Response finalized");
        Ok(token)
    }
}

fn header_name(name: &str) -> Result<HeaderName, ResponseError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ResponseError::InvalidHeaderName(name.to_string()))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ResponseError> {
    HeaderValue::from_str(value).map_err(|source| ResponseError::InvalidHeaderValue {
        name: name.to_string(),
        source,
    })
}

#[derive(Serialize)]
struct AbortBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<Value>,
}

impl RequestContext {
    /// Set the outgoing status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.response_mut().set_status(status);
    }

    /// Effective outgoing status (200 unless set).
    pub fn status(&self) -> StatusCode {
        self.response().status()
    }

    /// Merge headers into the response, replacing any earlier value per name.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> Result<(), ResponseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for (name, value) in headers {
            let (name, value) = (name.as_ref(), value.as_ref());
            parsed.push((header_name(name)?, header_value(name, value)?));
        }
        for (name, value) in parsed {
            self.response_mut().insert(name, value);
        }
        Ok(())
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError> {
        self.set_headers([(name, value)])
    }

    /// Content-Type.
    pub fn set_type(&mut self, value: &str) -> Result<(), ResponseError> {
        self.set_header(header::CONTENT_TYPE.as_str(), value)
    }

    /// Cache-Control.
    pub fn set_cache(&mut self, value: &str) -> Result<(), ResponseError> {
        self.set_header(header::CACHE_CONTROL.as_str(), value)
    }

    pub fn set_length(&mut self, length: u64) {
        self.response_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    pub fn set_charset(&mut self, charset: Charset) {
        self.response_mut().charset = charset;
    }

    /// Replace the Set-Cookie list with one `key=value;` entry per cookie.
    pub fn set_cookies<I, K, V>(&mut self, cookies: I) -> Result<(), ResponseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut values = Vec::new();
        for (key, value) in cookies {
            let cookie = format_set_cookie(key.as_ref(), value.as_ref());
            values.push(header_value(header::SET_COOKIE.as_str(), &cookie)?);
        }

        let response = self.response_mut();
        if response.is_finalized() {
            tracing::debug!(context = %response.context, "Set-Cookie write after finalize ignored");
            return Ok(());
        }
        response.headers.remove(header::SET_COOKIE);
        for value in values {
            response.headers.append(header::SET_COOKIE, value);
        }
        Ok(())
    }

    /// Finalize with `payload`, reporting a repeated finalize.
    pub fn try_send(&mut self, payload: impl Into<Payload>) -> Result<Finalized, ResponseError> {
        self.response_mut().finalize(payload.into())
    }

    /// Finalize with `payload`. A repeated send is ignored and returns the first token.
    pub fn send(&mut self, payload: impl Into<Payload>) -> Finalized {
        let context = self.id();
        match self.try_send(payload) {
            Ok(token) => token,
            Err(_) => {
                tracing::debug!(context = %context, "Body write after finalize ignored");
                self.response()
                    .finalized()
                    .unwrap_or(Finalized { context })
            }
        }
    }

    /// Finalize with an empty body.
    pub fn end(&mut self) -> Finalized {
        self.send(Bytes::new())
    }

    /// 301 to `target` with an empty body.
    pub fn redirect(&mut self, target: &str) -> Result<Finalized, ResponseError> {
        let location = header_value(header::LOCATION.as_str(), target)?;
        self.set_status(StatusCode::MOVED_PERMANENTLY);
        self.response_mut().insert(header::LOCATION, location);
        Ok(self.end())
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<Finalized, ResponseError> {
        let body = serde_json::to_string(value)?;
        Ok(self.send_typed(JSON, body))
    }

    pub fn html(&mut self, html: impl Into<String>) -> Finalized {
        self.send_typed(HTML, html.into())
    }

    pub fn text(&mut self, text: impl Into<String>) -> Finalized {
        self.send_typed(TEXT, text.into())
    }

    pub fn render<R: Render + ?Sized>(&mut self, view: &R) -> Result<Finalized, ResponseError> {
        let html = view.render().map_err(ResponseError::Render)?;
        Ok(self.send_typed(HTML, html))
    }

    /// Send `{message, info}` as JSON with `status`, returning the value that stops dispatch.
    ///
    /// ```ignore
    /// return Err(ctx.abort(StatusCode::FORBIDDEN, "not yours", None));
    /// ```
    pub fn abort(&mut self, status: StatusCode, message: &str, info: Option<Value>) -> HandlerError {
        self.set_status(status);
        let body = AbortBody { message, info };
        match serde_json::to_string(&body) {
            Ok(json) => HandlerError::Halted(self.send_typed(JSON, json)),
            Err(e) => HandlerError::Response(e.into()),
        }
    }

    /// Abort unless `condition` holds.
    pub fn ensure(
        &mut self,
        condition: bool,
        status: StatusCode,
        message: &str,
        info: Option<Value>,
    ) -> Result<(), HandlerError> {
        if condition {
            Ok(())
        } else {
            Err(self.abort(status, message, info))
        }
    }

    fn send_typed(&mut self, content_type: &'static str, body: String) -> Finalized {
        self.response_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.set_charset(Charset::Utf8);
        self.send(body)
    }
}
