//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline, audit logger, server:
//!     → logging.rs (structured tracing events, request ID on every event)
//!     → metrics.rs (counters by outcome and log kind)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Canonical redirects are never written to the audit log; they show up here instead
//! - Metrics are no-ops until a recorder is installed, so tests need no setup

pub mod logging;
pub mod metrics;
