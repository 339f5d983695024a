//! Rule-based redirect resolution and audit logging for axum applications.

pub mod admin;
pub mod audit;
pub mod canonical;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod rules;

pub use config::schema::RedirectConfig;
pub use error::ResolveError;
pub use http::RedirectServer;
pub use lifecycle::Shutdown;
pub use pipeline::{Outcome, RedirectDecision, RequestLifecycle, Resolver};
