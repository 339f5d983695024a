//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the redirect
//! gate. All types derive Serde traits for deserialization from config files,
//! and every field has a default so a missing section means "feature off".

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RedirectConfig {
    /// Listener configuration (bind address, trusted proxies).
    pub listener: ListenerConfig,

    /// Canonical scheme/host settings.
    pub canonical: CanonicalConfig,

    /// Redirect execution settings (cache policy, transport, protected paths).
    pub redirects: RedirectSettings,

    /// Audit log settings.
    pub audit: AuditConfig,

    /// Rule storage settings.
    pub rules: RulesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin surface settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Peers whose `X-Forwarded-For` header is trusted for the client IP.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            trusted_proxies: Vec::new(),
        }
    }
}

/// Which form of the host name is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreferredDomain {
    /// Leave the host alone.
    #[default]
    None,
    /// Add a leading `www.`.
    Www,
    /// Strip a leading `www.`.
    NoWww,
}

/// Canonical domain settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CanonicalConfig {
    /// Redirect plain http requests to https.
    pub force_https: bool,

    /// Preferred `www.` form.
    pub preferred_domain: PreferredDomain,

    /// Hosts that are redirected to `site_domain`.
    pub aliases: Vec<String>,

    /// Canonical host for alias rewrites.
    pub site_domain: Option<String>,

    /// Relocate every request to this domain (e.g. "https://new.example.com").
    pub relocate: Option<String>,

    /// Path prefixes that are never relocated.
    pub relocate_protected: Vec<String>,
}

impl Default for CanonicalConfig {
    fn default() -> Self {
        Self {
            force_https: false,
            preferred_domain: PreferredDomain::None,
            aliases: Vec::new(),
            site_domain: None,
            relocate: None,
            relocate_protected: vec![crate::admin::ADMIN_PREFIX.to_string()],
        }
    }
}

/// Cache policy applied to 301 redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Send explicit no-cache headers.
    NoCache,
    /// Send no cache header at all.
    #[default]
    Default,
    /// Cache for a fixed number of hours.
    Hours(u32),
}

/// How responses are written back through the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Detect from the process environment.
    #[default]
    Auto,
    /// Plain status code and headers.
    Standard,
    /// FastCGI/IIS: also send a `Status:` header.
    Cgi,
    /// Emit status and `Location` only and stop processing.
    Immediate,
}

/// Redirect execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectSettings {
    /// Value sent in `X-Redirect-By` and used to recognise our own redirects.
    pub agent_name: String,

    /// Cache policy for 301 redirects.
    pub cache: CachePolicy,

    /// Increment rule hit counters on every match.
    pub track_hits: bool,

    /// Path prefixes that are never matched against rules.
    pub protected_paths: Vec<String>,

    /// Response transport selection.
    pub transport: TransportMode,

    /// `SERVER_SOFTWARE` fragments of proxies that need the immediate transport.
    pub immediate_proxies: Vec<String>,
}

impl Default for RedirectSettings {
    fn default() -> Self {
        Self {
            agent_name: "redirect-gate".to_string(),
            cache: CachePolicy::Default,
            track_hits: true,
            protected_paths: vec![crate::admin::ADMIN_PREFIX.to_string()],
            transport: TransportMode::Auto,
            immediate_proxies: vec!["flywheel".to_string(), "litespeed".to_string()],
        }
    }
}

/// How client IPs are written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IpLogging {
    /// Do not record the IP.
    Off,
    /// Record the full IP.
    #[default]
    Full,
    /// Zero the host part of the IP.
    Anonymize,
}

/// Log entry schema version of the log store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSchema {
    V1,
    V2,
    #[default]
    V3,
}

/// Audit log settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Server identity written into every entry; defaults to the request host.
    pub server_name: Option<String>,

    /// Log 404s.
    pub log_404: bool,

    /// Log redirects issued by anything other than a rule.
    pub log_external: bool,

    /// Include request headers in `request_data`.
    pub log_header: bool,

    /// IP privacy mode.
    pub ip_logging: IpLogging,

    /// Days to keep 404 entries. 0 keeps forever, negative disables 404 logging.
    pub expire_404_days: i64,

    /// Days to keep redirect entries. 0 or negative keeps forever.
    pub expire_redirect_days: i64,

    /// Schema version of the log store.
    pub schema: LogSchema,

    /// Append entries to this JSON-lines file; in memory when unset.
    pub log_file: Option<PathBuf>,

    /// Redirect source tags that are considered internal and dropped from the source hint.
    pub internal_sources: Vec<String>,

    /// Interval between expiry sweeps in seconds.
    pub prune_interval_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            server_name: None,
            log_404: true,
            log_external: false,
            log_header: false,
            ip_logging: IpLogging::Full,
            expire_404_days: 7,
            expire_redirect_days: 7,
            schema: LogSchema::V3,
            log_file: None,
            internal_sources: vec!["axum".to_string(), "tower-http".to_string()],
            prune_interval_secs: 3600,
        }
    }
}

/// Rule storage settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RulesConfig {
    /// JSON file holding the rule set; the store is empty and in-memory when unset.
    pub file: Option<PathBuf>,

    /// Write the rule set (with counters) back to `file` on shutdown.
    pub save_on_shutdown: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin router.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
