use std::path::PathBuf;

use axum::http::StatusCode;
use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;

use routewalk::config::{load_config, ServerConfig};
use routewalk::observability::{init_logging, metrics};
use routewalk::lifecycle::spawn_signal_handler;
use routewalk::{App, HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "routewalk", version, about = "Routing and plugin dispatch server")]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn demo_app() -> Result<App, routewalk::RouteError> {
    let mut app = App::new();
    app.plugin(|ctx, next| {
        Box::pin(async move {
            tracing::debug!(context = %ctx.id(), method = %ctx.method(), url = ctx.url(), "Incoming");
            Ok(next.proceed())
        })
    })?
    .use_at("/admin/:page", |ctx, next| {
        Box::pin(async move {
            let token = ctx.cookie("token").map(str::to_string);
            ctx.ensure(token.as_deref() == Some("letmein"), StatusCode::UNAUTHORIZED, "login required", None)?;
            Ok(next.proceed())
        })
    })?
    .get("/", |ctx| Box::pin(async move { Ok(ctx.text("routewalk")) }))?
    .get("/hello/:name", |ctx| {
        Box::pin(async move {
            let name = ctx.param("name").unwrap_or("world").to_string();
            Ok(ctx.json(&json!({ "hello": name }))?)
        })
    })?
    .post("/echo", |ctx| {
        Box::pin(async move {
            let body = ctx.body_json();
            Ok(ctx.json(&body)?)
        })
    })?
    .get("/admin/:page", |ctx| Box::pin(async move { Ok(ctx.html("<h1>admin</h1>")) }))?;
    Ok(app)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    init_logging(&config.observability)?;
    tracing::info!("routewalk v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        max_body_bytes = config.listener.max_body_bytes,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, demo_app()?);
    let server_shutdown = shutdown.subscribe();

    spawn_signal_handler(shutdown.clone());

    server.run(listener, server_shutdown).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
