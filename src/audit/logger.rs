//! Audit log decisions.
//!
//! # Responsibilities
//! - Decide whether a checkpoint produces an entry (404 switches, expiry, external redirects)
//! - Build the entry: server identity, IP privacy, optional header capture
//! - Hand the entry to the writer, swallowing and counting failures
//! - Sweep expired entries
//!
//! # Design Decisions
//! - Matched redirects are always logged; only 404 and external entries can be switched off
//! - `cookie` and `authorization` header values are never captured

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::audit::entry::{anonymize_ip, LogEntry, LogKind};
use crate::audit::schema;
use crate::audit::writer::LogWriter;
use crate::canonical::comparable_host;
use crate::config::{AuditConfig, IpLogging};
use crate::http::request::RedirectRequest;
use crate::observability::metrics;

const SENSITIVE_HEADERS: &[&str] = &["cookie", "authorization"];

/// Writes audit entries according to the audit configuration.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    config: AuditConfig,
    agent_name: String,
    writer: Arc<dyn LogWriter>,
}

impl AuditLogger {
    pub fn new(config: AuditConfig, agent_name: impl Into<String>, writer: Arc<dyn LogWriter>) -> Self {
        Self {
            config,
            agent_name: agent_name.into(),
            writer,
        }
    }

    pub fn writer(&self) -> &Arc<dyn LogWriter> {
        &self.writer
    }

    /// 404 logging is on and not disabled through a negative expiry.
    pub fn logs_not_found(&self) -> bool {
        self.config.log_404 && self.config.expire_404_days >= 0
    }

    /// Record a redirect (or status/pass-through) produced by a rule.
    pub fn log_redirect(
        &self,
        request: &RedirectRequest,
        rule_id: Option<u64>,
        target: Option<&str>,
        status: u16,
    ) -> bool {
        let entry = LogEntry {
            http_code: Some(status),
            sent_to: target.map(str::to_string),
            rule_id,
            redirect_by: Some(self.agent_name.clone()),
            ..self.base_entry(LogKind::Redirect, request)
        };
        self.write(entry)
    }

    /// Record a request the host answered with 404.
    pub fn log_not_found(&self, request: &RedirectRequest) -> bool {
        if !self.logs_not_found() {
            return false;
        }
        let entry = LogEntry {
            http_code: Some(404),
            ..self.base_entry(LogKind::NotFound, request)
        };
        self.write(entry)
    }

    /// Record a redirect issued by something other than a rule.
    pub fn log_external(
        &self,
        request: &RedirectRequest,
        target: &str,
        status: u16,
        source: Option<&str>,
    ) -> bool {
        if !self.config.log_external {
            return false;
        }

        let source = source.filter(|s| !self.is_internal_source(s));
        let mut entry = LogEntry {
            http_code: Some(status),
            sent_to: Some(target.to_string()),
            redirect_by: source.map(str::to_string),
            ..self.base_entry(LogKind::Redirect, request)
        };
        if let Some(source) = source {
            let data = entry
                .request_data
                .get_or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = data {
                map.insert("source".into(), Value::from(vec![source.to_string()]));
            }
        }
        self.write(entry)
    }

    /// Remove entries past their expiry. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let sweeps = [
            (LogKind::Redirect, self.config.expire_redirect_days),
            (LogKind::NotFound, self.config.expire_404_days),
        ];

        let mut removed = 0;
        for (kind, days) in sweeps {
            if days <= 0 {
                continue;
            }
            let cutoff = Duration::try_days(days).and_then(|age| now.checked_sub_signed(age));
            let Some(cutoff) = cutoff else {
                tracing::warn!(kind = kind.as_str(), days, "Log expiry out of range, sweep skipped");
                continue;
            };
            match self.writer.prune(kind, cutoff) {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::warn!(kind = kind.as_str(), error = %e, "Log expiry sweep failed");
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Expired log entries removed");
        }
        removed
    }

    fn is_internal_source(&self, source: &str) -> bool {
        source.eq_ignore_ascii_case(&self.agent_name)
            || self
                .config
                .internal_sources
                .iter()
                .any(|s| s.eq_ignore_ascii_case(source))
    }

    fn base_entry(&self, kind: LogKind, request: &RedirectRequest) -> LogEntry {
        let domain = comparable_host(request.host());
        let server = self
            .config
            .server_name
            .clone()
            .unwrap_or_else(|| domain.clone());

        let ip = match self.config.ip_logging {
            IpLogging::Off => None,
            IpLogging::Full => request.client_ip().map(|ip| ip.to_string()),
            IpLogging::Anonymize => request.client_ip().map(|ip| anonymize_ip(ip).to_string()),
        };

        let request_data = self.config.log_header.then(|| {
            let mut data = Map::new();
            data.insert("headers".into(), Value::Object(self.capture_headers(request)));
            Value::Object(data)
        });

        LogEntry {
            ip,
            agent: request.user_agent().map(str::to_string),
            referrer: request.referrer().map(str::to_string),
            request_method: Some(request.method().to_string()),
            domain: Some(domain),
            request_data,
            ..LogEntry::new(kind, server, request.full_url())
        }
    }

    fn capture_headers(&self, request: &RedirectRequest) -> Map<String, Value> {
        let mut headers = Map::new();
        for name in request.headers().keys() {
            if SENSITIVE_HEADERS.contains(&name.as_str()) {
                continue;
            }
            let values: Vec<&str> = request
                .headers()
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            headers.insert(name.as_str().to_string(), Value::from(values.join(", ")));
        }
        headers
    }

    fn write(&self, entry: LogEntry) -> bool {
        let kind = entry.kind;
        let entry = schema::restrict(entry, self.config.schema);
        match self.writer.append(&entry) {
            Ok(()) => {
                metrics::record_log_entry(kind.as_str());
                tracing::debug!(kind = kind.as_str(), url = %entry.url, "Audit entry written");
                true
            }
            Err(e) => {
                metrics::record_log_failure();
                tracing::warn!(kind = kind.as_str(), url = %entry.url, error = %e, "Audit write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::writer::{LogWriteError, MemoryLogWriter};
    use crate::config::LogSchema;

    #[derive(Debug)]
    struct FailingWriter;

    impl LogWriter for FailingWriter {
        fn append(&self, _: &LogEntry) -> Result<(), LogWriteError> {
            Err(LogWriteError::Poisoned)
        }

        fn prune(&self, _: LogKind, _: DateTime<Utc>) -> Result<usize, LogWriteError> {
            Err(LogWriteError::Poisoned)
        }

        fn entries(&self, _: Option<LogKind>) -> Result<Vec<LogEntry>, LogWriteError> {
            Ok(Vec::new())
        }
    }

    fn logger(f: impl FnOnce(&mut AuditConfig)) -> (AuditLogger, Arc<MemoryLogWriter>) {
        let mut config = AuditConfig::default();
        f(&mut config);
        let writer = Arc::new(MemoryLogWriter::new());
        (AuditLogger::new(config, "redirect-gate", writer.clone()), writer)
    }

    fn request() -> RedirectRequest {
        RedirectRequest::get("http://Example.com:8080/old?x=1")
            .unwrap()
            .with_client_ip("198.51.100.23".parse().unwrap())
            .with_header("user-agent", "curl/8")
            .with_header("cookie", "session=secret")
            .with_header("accept", "text/html")
    }

    #[test]
    fn test_redirect_entry_fields() {
        let (logger, writer) = logger(|_| {});
        assert!(logger.log_redirect(&request(), Some(3), Some("/new"), 301));

        let entries = writer.entries(None).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.kind, LogKind::Redirect);
        assert_eq!(e.server, "example.com");
        assert_eq!(e.domain.as_deref(), Some("example.com"));
        assert_eq!(e.ip.as_deref(), Some("198.51.100.23"));
        assert_eq!(e.agent.as_deref(), Some("curl/8"));
        assert_eq!(e.http_code, Some(301));
        assert_eq!(e.sent_to.as_deref(), Some("/new"));
        assert_eq!(e.rule_id, Some(3));
        assert_eq!(e.request_method.as_deref(), Some("GET"));
        assert!(e.request_data.is_none());
    }

    #[test]
    fn test_ip_privacy_modes() {
        let (anon, writer) = logger(|c| c.ip_logging = IpLogging::Anonymize);
        anon.log_not_found(&request());
        assert_eq!(writer.entries(None).unwrap()[0].ip.as_deref(), Some("198.51.100.0"));

        let (off, writer) = logger(|c| c.ip_logging = IpLogging::Off);
        off.log_not_found(&request());
        assert!(writer.entries(None).unwrap()[0].ip.is_none());
    }

    #[test]
    fn test_header_capture_drops_sensitive_values() {
        let (logger, writer) = logger(|c| c.log_header = true);
        logger.log_not_found(&request());

        let data = writer.entries(None).unwrap()[0].request_data.clone().unwrap();
        assert_eq!(data["headers"]["accept"], "text/html");
        assert!(data["headers"].get("cookie").is_none());
    }

    #[test]
    fn test_not_found_switches() {
        let (off, writer) = logger(|c| c.log_404 = false);
        assert!(!off.log_not_found(&request()));
        assert!(writer.entries(None).unwrap().is_empty());

        let (negative, writer) = logger(|c| c.expire_404_days = -1);
        assert!(!negative.log_not_found(&request()));
        assert!(writer.entries(None).unwrap().is_empty());

        let (forever, writer) = logger(|c| c.expire_404_days = 0);
        assert!(forever.log_not_found(&request()));
        assert_eq!(writer.entries(Some(LogKind::NotFound)).unwrap().len(), 1);
    }

    #[test]
    fn test_external_redirect_source_filtering() {
        let (disabled, writer) = logger(|_| {});
        assert!(!disabled.log_external(&request(), "/elsewhere", 302, Some("plugin")));
        assert!(writer.entries(None).unwrap().is_empty());

        let (logger, writer) = logger(|c| c.log_external = true);
        logger.log_external(&request(), "/elsewhere", 302, Some("shop-plugin"));
        logger.log_external(&request(), "/elsewhere", 302, Some("tower-http"));
        logger.log_external(&request(), "/elsewhere", 302, Some("Redirect-Gate"));

        let entries = writer.entries(None).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].redirect_by.as_deref(), Some("shop-plugin"));
        assert_eq!(entries[0].request_data.as_ref().unwrap()["source"][0], "shop-plugin");
        assert!(entries[1].redirect_by.is_none());
        assert!(entries[2].redirect_by.is_none());
        assert!(entries[2].rule_id.is_none());
    }

    #[test]
    fn test_schema_restriction_applies() {
        let (logger, writer) = logger(|c| c.schema = LogSchema::V1);
        logger.log_redirect(&request(), Some(1), Some("/new"), 301);
        let e = &writer.entries(None).unwrap()[0];
        assert!(e.http_code.is_none());
        assert!(e.domain.is_none());
        assert_eq!(e.server, "example.com");
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let logger = AuditLogger::new(AuditConfig::default(), "rg", Arc::new(FailingWriter));
        assert!(!logger.log_redirect(&request(), Some(1), Some("/new"), 301));
        assert_eq!(logger.prune(Utc::now()), 0);
    }

    #[test]
    fn test_prune_by_expiry() {
        let (logger, writer) = logger(|c| {
            c.expire_redirect_days = 0;
            c.expire_404_days = 7;
        });
        let old = LogEntry {
            created: Utc::now() - Duration::days(30),
            ..LogEntry::new(LogKind::NotFound, "example.com", "/gone")
        };
        writer.append(&old).unwrap();
        writer
            .append(&LogEntry {
                kind: LogKind::Redirect,
                ..old.clone()
            })
            .unwrap();

        assert_eq!(logger.prune(Utc::now()), 1);
        assert_eq!(writer.entries(Some(LogKind::Redirect)).unwrap().len(), 1);
    }

    #[test]
    fn test_prune_skips_unrepresentable_expiry() {
        let (logger, writer) = logger(|c| {
            c.expire_404_days = 1_000_000_000;
            c.expire_redirect_days = 7;
        });
        let old = LogEntry {
            created: Utc::now() - Duration::days(30),
            ..LogEntry::new(LogKind::Redirect, "example.com", "/old")
        };
        writer.append(&old).unwrap();
        writer
            .append(&LogEntry {
                kind: LogKind::NotFound,
                ..old.clone()
            })
            .unwrap();

        assert_eq!(logger.prune(Utc::now()), 1);
        assert_eq!(writer.entries(Some(LogKind::NotFound)).unwrap().len(), 1);
    }
}
