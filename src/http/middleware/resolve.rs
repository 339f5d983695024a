//! The host request lifecycle as an axum middleware.
//!
//! # Responsibilities
//! - Resolve every request once, before the host router sees it
//! - Return canonical and matched redirects without calling the host
//! - Rewrite the URI for pass-through rules
//! - Run the 404 and external-redirect checkpoints on the host's response
//!
//! # Design Decisions
//! - The lifecycle handle travels in request extensions so host handlers can
//!   ask for a redirect veto through `Extension<Arc<RequestLifecycle>>`
//! - A request that already carries a handle is not resolved again
//! - Host redirects that bypassed `external_redirect` are detected from the
//!   3xx response and logged; they can no longer be vetoed

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::http::request::RedirectRequest;
use crate::http::response::X_REDIRECT_BY;
use crate::pipeline::{RequestLifecycle, Resolver};

/// The current resolver generation, swapped on config reload.
pub type SharedResolver = Arc<ArcSwap<Resolver>>;

pub async fn resolve_middleware(
    State(resolver): State<SharedResolver>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.extensions().get::<Arc<RequestLifecycle>>().is_some() {
        return next.run(request).await;
    }

    let resolver = resolver.load_full();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (mut parts, body) = request.into_parts();
    let lifecycle = resolver.begin(RedirectRequest::from_parts(
        &parts,
        peer,
        resolver.trusted_proxies(),
    ));

    if let Some(mut response) = lifecycle.start() {
        lifecycle.send_headers(&mut response);
        return response;
    }

    if let Some(target) = lifecycle.pass_through_target() {
        match target.parse::<Uri>() {
            Ok(uri) => {
                tracing::debug!(
                    request_id = %lifecycle.request().request_id(),
                    from = %parts.uri,
                    to = %uri,
                    "Serving pass-through target"
                );
                parts.uri = uri;
            }
            Err(e) => tracing::warn!(
                request_id = %lifecycle.request().request_id(),
                target = %target,
                error = %e,
                "Pass-through target is not a valid URI"
            ),
        }
    }

    parts.extensions.insert(lifecycle.clone());
    let mut response = next.run(Request::from_parts(parts, body)).await;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        if let Some(replacement) = lifecycle.not_found() {
            response = replacement;
        }
    } else if status.is_redirection() {
        let headers = response.headers();
        if let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) {
            let source = headers.get(X_REDIRECT_BY).and_then(|v| v.to_str().ok());
            lifecycle.external_redirect(location, status.as_u16(), source);
        }
    }

    lifecycle.send_headers(&mut response);
    response
}
