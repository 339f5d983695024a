//! Canonical domain resolution.
//!
//! # Data Flow
//! ```text
//! scheme + host + path (from the request)
//!     → relocation (rewrite host only, highest priority)
//!     → else alias / www / https normalization
//!     → target differs from current URL? → 301, pipeline stops
//! ```
//!
//! # Design Decisions
//! - Runs before and independently of rule matching
//! - Host comparison is case-insensitive and ignores a trailing port
//! - A canonical redirect is its own outcome and never reaches the audit log

pub mod resolver;

pub use resolver::{CanonicalRedirect, CanonicalRequest, CanonicalResolver, RelocationTarget};

/// Strip a trailing `:port` from a host, keeping IPv6 brackets intact.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((bare, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => bare,
        _ => host,
    }
}

/// The `:port` suffix of a host, if any.
pub(crate) fn port_suffix(host: &str) -> &str {
    &host[strip_port(host).len()..]
}

/// Lowercased host without port, the form used for every host comparison.
pub(crate) fn comparable_host(host: &str) -> String {
    strip_port(host.trim()).trim_end_matches('.').to_ascii_lowercase()
}
