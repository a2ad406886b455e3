//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router: one catch-all route into the dispatch engine
//! - Wire up middleware (request ID, tracing)
//! - Buffer request bodies up to the configured limit
//! - Record per-request metrics
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::app::App;
use crate::config::ServerConfig;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// State injected into the catch-all handler.
#[derive(Clone)]
struct AppState {
    app: Arc<App>,
    max_body_bytes: usize,
}

/// HTTP server running one [`App`].
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(config: ServerConfig, app: App) -> Self {
        let state = AppState {
            app: Arc::new(app),
            max_body_bytes: config.listener.max_body_bytes,
        };
        let router = Self::build_router(state);
        Self { router, config }
    }

    fn build_router(state: AppState) -> Router {
        let request_id_header = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id_header)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(Shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Buffers the request and hands it to the dispatch engine.
async fn dispatch_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().to_string();

    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > state.max_body_bytes) {
        return reject_body(&request_id, &method, state.max_body_bytes, start_time);
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to buffer request body");
            return reject_body(&request_id, &method, state.max_body_bytes, start_time);
        }
    };

    let (outcome, response) = state
        .app
        .handle(Request::from_parts(parts, bytes), Some(peer))
        .await;

    tracing::debug!(
        request_id = %request_id,
        status = response.status().as_u16(),
        outcome = outcome.as_str(),
        "Request dispatched"
    );
    metrics::record_request(&method, response.status().as_u16(), outcome.as_str(), start_time);
    response
}

fn reject_body(request_id: &str, method: &str, limit: usize, start_time: Instant) -> Response {
    tracing::warn!(request_id = %request_id, limit, "Request body over limit");
    metrics::record_request(method, 413, "body_rejected", start_time);
    (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
}
