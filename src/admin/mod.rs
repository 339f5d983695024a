//! Management surface for the rule store and audit log.
//!
//! # Responsibilities
//! - List and filter rules, create and update them, apply bulk actions
//! - List audit entries
//! - Report resolver status
//!
//! # Design Decisions
//! - Mounted under [`ADMIN_PREFIX`], which is also a default protected path,
//!   so no rule or canonical redirect can shadow it
//! - Every mutating call answers with the refreshed, filtered rule list
//! - Bearer-token auth on every route

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::middleware::SharedResolver;

/// Path prefix of the admin surface.
pub const ADMIN_PREFIX: &str = "/_redirects/";

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub resolver: SharedResolver,
    pub api_key: String,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    let routes = Router::new()
        .route("/status", get(get_status))
        .route("/rules", get(list_rules).post(create_rule))
        .route("/rules/{id}", put(update_rule))
        .route("/rules/bulk", post(bulk_rules))
        .route("/logs", get(list_logs))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state);

    Router::new().nest(ADMIN_PREFIX.trim_end_matches('/'), routes)
}
