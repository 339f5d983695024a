//! Audit trail of redirects and 404s.
//!
//! # Data Flow
//! ```text
//! Lifecycle checkpoint (redirect executed / not found / external redirect)
//!     → logger.rs (should this be logged? build the entry)
//!     → entry.rs (IP privacy, header capture)
//!     → schema.rs (drop fields the store's schema version lacks)
//!     → writer.rs (append; failures are swallowed and counted)
//! ```
//!
//! # Design Decisions
//! - At most one entry per request; the lifecycle handle enforces it
//! - A write failure never changes what the client receives

pub mod entry;
pub mod logger;
pub mod schema;
pub mod writer;

pub use entry::{anonymize_ip, LogEntry, LogKind};
pub use logger::AuditLogger;
pub use writer::{JsonLinesLogWriter, LogWriteError, LogWriter, MemoryLogWriter};
