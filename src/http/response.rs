//! Finalized context to wire response.
//!
//! # Responsibilities
//! - Carry the status, headers and body written through the context
//! - Stream lazy bodies instead of buffering them
//! - Guarantee a response even for a context that was never finalized
//!
//! # Design Decisions
//! - An unfinalized context becomes an empty 500 (logged; dispatch should never allow it)

use std::sync::PoisonError;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

use crate::context::response::SentBody;
use crate::context::RequestContext;

/// Convert a dispatched context into the response sent to the client.
pub fn into_response(ctx: RequestContext) -> Response<Body> {
    let context = ctx.id();
    let state = ctx.into_response_state();

    if !state.is_finalized() {
        tracing::error!(context = %context, "Context reached the wire without a response");
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        return response;
    }

    let (status, headers, body) = state.into_parts();
    let body = match body {
        Some(SentBody::Full(bytes)) => Body::from(bytes),
        Some(SentBody::Stream(stream)) => {
            Body::from_stream(stream.into_inner().unwrap_or_else(PoisonError::into_inner))
        }
        None => Body::empty(),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
