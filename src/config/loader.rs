//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::RedirectConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RedirectConfig, ConfigError> {
    let config: RedirectConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RedirectConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CachePolicy, PreferredDomain};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert!(!config.canonical.force_https);
        assert_eq!(config.redirects.cache, CachePolicy::Default);
        assert!(config.audit.log_404);
    }

    #[test]
    fn test_parse_sections() {
        let config = parse_config(
            r#"
            [canonical]
            force_https = true
            preferred_domain = "www"
            aliases = ["old.example.com"]
            site_domain = "example.com"

            [redirects]
            cache = { hours = 2 }

            [audit]
            expire_404_days = -1
            schema = "v1"
            "#,
        )
        .unwrap();

        assert!(config.canonical.force_https);
        assert_eq!(config.canonical.preferred_domain, PreferredDomain::Www);
        assert_eq!(config.redirects.cache, CachePolicy::Hours(2));
        assert_eq!(config.audit.expire_404_days, -1);
    }

    #[test]
    fn test_validation_errors_are_reported() {
        let err = parse_config(
            r#"
            [canonical]
            aliases = ["bad host/with/slash"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }
}
