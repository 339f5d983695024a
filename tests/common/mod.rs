//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::Path,
    http::{Request, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Router,
};
use std::sync::Arc;

use redirect_gate::audit::{LogEntry, LogKind, LogWriter, MemoryLogWriter};
use redirect_gate::http::transport::StandardTransport;
use redirect_gate::rules::{InMemoryRuleStore, Rule};
use redirect_gate::{RedirectConfig, RedirectDecision, RedirectServer, RequestLifecycle, Resolver};

pub const TEST_KEY: &str = "test-admin-key";

/// A server fronting [`host_app`], with in-memory rules and log.
pub struct TestServer {
    pub server: RedirectServer,
    pub store: Arc<InMemoryRuleStore>,
    pub writer: Arc<MemoryLogWriter>,
}

impl TestServer {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self::with_config(rules, |_| {})
    }

    pub fn with_config(rules: Vec<Rule>, configure: impl FnOnce(&mut RedirectConfig)) -> Self {
        let mut config = RedirectConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = TEST_KEY.to_string();
        configure(&mut config);

        let store = Arc::new(InMemoryRuleStore::with_rules(rules));
        let writer = Arc::new(MemoryLogWriter::new());
        let resolver = Resolver::new(
            &config,
            store.clone(),
            writer.clone(),
            Arc::new(StandardTransport),
        );
        let server = RedirectServer::with_resolver(
            config,
            resolver,
            store.clone(),
            writer.clone(),
            host_app(),
        );
        Self {
            server,
            store,
            writer,
        }
    }

    pub fn router(&self) -> Router {
        self.server.router()
    }

    pub fn logs(&self, kind: LogKind) -> Vec<LogEntry> {
        self.writer.entries(Some(kind)).unwrap()
    }
}

/// A small host application with real pages, a 404 fallback and a handler
/// that redirects on its own.
pub fn host_app() -> Router {
    Router::new()
        .route("/", get(|| async { "home" }))
        .route("/about", get(|| async { "about page" }))
        .route("/shop/{item}", get(|Path(item): Path<String>| async move {
            format!("shop item {}", item)
        }))
        .route("/legacy/{item}", get(legacy_item))
        .route("/moved", get(|| async {
            let mut response = Redirect::temporary("/about").into_response();
            response
                .headers_mut()
                .insert("x-redirect-by", "seo-plugin".parse().unwrap());
            response
        }))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
}

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

/// A GET request for `uri` on `host`.
pub fn get_request(host: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", host)
        .body(Body::empty())
        .unwrap()
}

/// An admin request carrying `key` as Bearer token.
pub fn admin_request(method: &str, uri: &str, key: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "example.com")
        .header("authorization", format!("Bearer {}", key));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
}
