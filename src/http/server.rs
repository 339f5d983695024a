//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap the host application router with the redirect middleware
//! - Mount the admin surface when enabled
//! - Wire up tracing and request timeouts
//! - Swap in a fresh resolver on config reload
//! - Run the audit expiry sweep
//! - Flush the rule store on shutdown

use arc_swap::ArcSwap;
use axum::{middleware, Router};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::{setup_admin_router, AdminState};
use crate::audit::LogWriter;
use crate::config::RedirectConfig;
use crate::http::middleware::{resolve_middleware, SharedResolver};
use crate::pipeline::Resolver;
use crate::rules::RuleStore;

/// A host application served behind the redirect pipeline.
pub struct RedirectServer {
    router: Router,
    config: RedirectConfig,
    resolver: SharedResolver,
    store: Arc<dyn RuleStore>,
    writer: Arc<dyn LogWriter>,
}

impl RedirectServer {
    /// Build the server, picking the response transport from the environment.
    pub fn new(
        config: RedirectConfig,
        store: Arc<dyn RuleStore>,
        writer: Arc<dyn LogWriter>,
        app: Router,
    ) -> Self {
        let resolver = Resolver::from_config(&config, store.clone(), writer.clone());
        Self::with_resolver(config, resolver, store, writer, app)
    }

    /// Build the server around an already assembled resolver.
    pub fn with_resolver(
        config: RedirectConfig,
        resolver: Resolver,
        store: Arc<dyn RuleStore>,
        writer: Arc<dyn LogWriter>,
        app: Router,
    ) -> Self {
        let resolver: SharedResolver = Arc::new(ArcSwap::from_pointee(resolver));
        let router = Self::build_router(&config, resolver.clone(), app);
        Self {
            router,
            config,
            resolver,
            store,
            writer,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RedirectConfig, resolver: SharedResolver, app: Router) -> Router {
        let mut router = app;
        if config.admin.enabled {
            router = router.merge(setup_admin_router(AdminState {
                resolver: resolver.clone(),
                api_key: config.admin.api_key.clone(),
            }));
        }

        router
            .layer(middleware::from_fn_with_state(resolver, resolve_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for serving or for `oneshot` tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn resolver(&self) -> SharedResolver {
        self.resolver.clone()
    }

    pub fn config(&self) -> &RedirectConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, applying configs from `config_updates` as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<RedirectConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            transport = self.resolver.load().transport().name(),
            admin = self.config.admin.enabled,
            "Redirect server starting"
        );

        self.spawn_reloader(config_updates, shutdown.resubscribe());
        self.spawn_pruner(shutdown.resubscribe());

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        if self.config.rules.save_on_shutdown {
            if let Err(e) = self.store.flush() {
                tracing::error!(error = %e, "Failed to save rules on shutdown");
            }
        }

        tracing::info!("Redirect server stopped");
        Ok(())
    }

    fn spawn_reloader(
        &self,
        mut config_updates: mpsc::UnboundedReceiver<RedirectConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let resolver = self.resolver.clone();
        let store = self.store.clone();
        let writer = self.writer.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => {
                        let Some(config) = update else { break };
                        let next = Resolver::from_config(&config, store.clone(), writer.clone());
                        resolver.store(Arc::new(next));
                        tracing::info!(
                            "Resolver reloaded; listener and admin changes need a restart"
                        );
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    fn spawn_pruner(&self, mut shutdown: broadcast::Receiver<()>) {
        let resolver = self.resolver.clone();
        let every = Duration::from_secs(self.config.audit.prune_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        resolver.load().logger().prune(Utc::now());
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }
}
