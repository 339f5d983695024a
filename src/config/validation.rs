//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate host names, relocation target, path prefixes
//! - Validate value ranges (timeouts > 0, bounded cache hours and log expiry)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RedirectConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{CachePolicy, RedirectConfig};

/// Ten years.
const MAX_CACHE_HOURS: u32 = 87_600;

/// One hundred years.
const MAX_EXPIRY_DAYS: i64 = 36_500;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &RedirectConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    for (i, alias) in config.canonical.aliases.iter().enumerate() {
        if !is_bare_host(alias) {
            errors.push(ValidationError::new(
                format!("canonical.aliases[{}]", i),
                format!("'{}' is not a bare host name", alias),
            ));
        }
    }
    if let Some(site) = &config.canonical.site_domain {
        if !is_bare_host(site) {
            errors.push(ValidationError::new(
                "canonical.site_domain",
                format!("'{}' is not a bare host name", site),
            ));
        }
    }
    if let Some(relocate) = &config.canonical.relocate {
        if crate::canonical::RelocationTarget::parse(relocate).is_none() {
            errors.push(ValidationError::new(
                "canonical.relocate",
                format!("'{}' is not a valid relocation target", relocate),
            ));
        }
    }
    check_prefixes(
        "canonical.relocate_protected",
        &config.canonical.relocate_protected,
        &mut errors,
    );
    check_prefixes(
        "redirects.protected_paths",
        &config.redirects.protected_paths,
        &mut errors,
    );

    match config.redirects.cache {
        CachePolicy::Hours(0) => errors.push(ValidationError::new(
            "redirects.cache",
            "cache hours must be greater than zero; use \"default\" to send no header",
        )),
        CachePolicy::Hours(hours) if hours > MAX_CACHE_HOURS => errors.push(ValidationError::new(
            "redirects.cache",
            format!("cache hours must be at most {}", MAX_CACHE_HOURS),
        )),
        _ => {}
    }
    if config.redirects.agent_name.trim().is_empty() {
        errors.push(ValidationError::new("redirects.agent_name", "must not be empty"));
    }

    for (field, days) in [
        ("audit.expire_404_days", config.audit.expire_404_days),
        ("audit.expire_redirect_days", config.audit.expire_redirect_days),
    ] {
        if days > MAX_EXPIRY_DAYS {
            errors.push(ValidationError::new(
                field,
                format!("must be at most {} days", MAX_EXPIRY_DAYS),
            ));
        }
    }
    if config.audit.prune_interval_secs == 0 {
        errors.push(ValidationError::new(
            "audit.prune_interval_secs",
            "must be greater than zero",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_prefixes(field: &str, prefixes: &[String], errors: &mut Vec<ValidationError>) {
    for (i, prefix) in prefixes.iter().enumerate() {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{}[{}]", field, i),
                format!("'{}' must start with '/'", prefix),
            ));
        }
    }
}

/// A host name with an optional port and nothing else.
fn is_bare_host(host: &str) -> bool {
    !host.is_empty()
        && !host.contains(['/', '?', '#', '@', ' '])
        && url::Host::parse(crate::canonical::strip_port(host)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RedirectConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RedirectConfig::default();
        config.listener.bind_address = "nope".into();
        config.canonical.aliases = vec!["ok.example.com".into(), "http://bad".into()];
        config.redirects.protected_paths = vec!["admin".into()];
        config.redirects.cache = CachePolicy::Hours(0);

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "canonical.aliases[1]",
                "redirects.protected_paths[0]",
                "redirects.cache",
            ]
        );
    }

    #[test]
    fn test_cache_hours_and_expiry_are_bounded() {
        let mut config = RedirectConfig::default();
        config.redirects.cache = CachePolicy::Hours(u32::MAX);
        config.audit.expire_404_days = 1_000_000_000;
        config.audit.expire_redirect_days = -1;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["redirects.cache", "audit.expire_404_days"]);

        config.redirects.cache = CachePolicy::Hours(MAX_CACHE_HOURS);
        config.audit.expire_404_days = MAX_EXPIRY_DAYS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_alias_with_port_is_bare() {
        assert!(is_bare_host("example.com:8080"));
        assert!(!is_bare_host("example.com/path"));
    }
}
