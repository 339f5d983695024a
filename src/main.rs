//! redirect-gate
//!
//! Serves a small host application behind the redirect pipeline.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    REDIRECT GATE                     │
//!                 │                                                      │
//!  Client Request │  ┌──────────┐   ┌───────────┐   ┌───────────────┐    │
//!  ───────────────┼─▶│  server  │──▶│ canonical │──▶│ rules matcher │    │
//!                 │  │ (axum)   │   │ resolver  │   │ (+ store)     │    │
//!                 │  └──────────┘   └─────┬─────┘   └───────┬───────┘    │
//!                 │                       │ 301             │            │
//!                 │                       ▼                 ▼            │
//!  Client Response│  ┌──────────┐   ┌───────────┐   ┌───────────────┐    │
//!  ◀──────────────┼──│transport │◀──│  shaper   │◀──│  host router  │    │
//!                 │  └──────────┘   └───────────┘   │  (no match)   │    │
//!                 │                                 └───────┬───────┘    │
//!                 │                                         ▼            │
//!                 │                                  ┌─────────────┐     │
//!                 │                                  │ audit log   │     │
//!                 │                                  └─────────────┘     │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Router,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use redirect_gate::config::loader::load_config;
use redirect_gate::config::watcher::ConfigWatcher;
use redirect_gate::lifecycle::{signals, startup, Shutdown};
use redirect_gate::observability::{logging, metrics};
use redirect_gate::{RedirectConfig, RedirectDecision, RedirectServer, RequestLifecycle};

#[derive(Parser)]
#[command(name = "redirect-gate")]
#[command(about = "Rule-based redirects and audit logging in front of an axum app", long_about = None)]
struct Args {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RedirectConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "redirect-gate starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = startup::open_rule_store(&config)?;
    let writer = startup::open_log_writer(&config);

    // The watcher must outlive the server or notifications stop.
    let (config_updates, _watcher) = match (&args.config, args.no_watch) {
        (Some(path), false) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        rules = store.len(),
        "Listening for connections"
    );

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    let server = RedirectServer::new(config, store, writer, host_app());
    server
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// The application the pipeline fronts.
fn host_app() -> Router {
    Router::new()
        .route("/", get(|| async { "redirect-gate host" }))
        .route("/shop/{item}", get(shop_item))
        .route("/legacy/{item}", get(legacy_item))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
}

async fn shop_item(Path(item): Path<String>) -> String {
    format!("shop item {}", item)
}

/// Moves legacy URLs to the shop unless a pass-through rule owns the request.
async fn legacy_item(
    Path(item): Path<String>,
    lifecycle: Option<Extension<Arc<RequestLifecycle>>>,
) -> Response {
    let location = format!("/shop/{}", item);
    let decision = match &lifecycle {
        Some(Extension(lifecycle)) => lifecycle.external_redirect(&location, 302, Some("legacy-shop")),
        None => RedirectDecision::Allow,
    };
    match decision {
        RedirectDecision::Allow => Redirect::to(&location).into_response(),
        RedirectDecision::Veto => format!("legacy item {}", item).into_response(),
    }
}
