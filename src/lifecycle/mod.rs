//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Open rule store and log writer → Build resolver
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → server stops accepting → background tasks exit → rules flushed
//! ```
//!
//! # Design Decisions
//! - Fail fast: a bad config or unreadable rule file aborts startup
//! - One broadcast channel fans the shutdown out to every task

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
