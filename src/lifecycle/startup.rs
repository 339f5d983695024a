//! Startup helpers: open the collaborators the resolver is built from.

use std::sync::Arc;

use crate::audit::{JsonLinesLogWriter, LogWriter, MemoryLogWriter};
use crate::config::RedirectConfig;
use crate::rules::{InMemoryRuleStore, StoreError};

/// Open the rule store, loading the configured rule file when there is one.
pub fn open_rule_store(config: &RedirectConfig) -> Result<Arc<InMemoryRuleStore>, StoreError> {
    let store = match &config.rules.file {
        Some(path) => InMemoryRuleStore::load_from_file(path)?,
        None => {
            tracing::info!("No rule file configured, starting with an empty rule set");
            InMemoryRuleStore::new()
        }
    };
    Ok(Arc::new(store))
}

/// The audit log writer: a JSON-lines file when configured, memory otherwise.
pub fn open_log_writer(config: &RedirectConfig) -> Arc<dyn LogWriter> {
    match &config.audit.log_file {
        Some(path) => {
            tracing::info!(path = ?path, "Audit log file");
            Arc::new(JsonLinesLogWriter::new(path.clone()))
        }
        None => Arc::new(MemoryLogWriter::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Action, NewRule, RuleStore, SourcePattern};

    #[test]
    fn test_open_rule_store_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let mut config = RedirectConfig::default();
        config.rules.file = Some(path.clone());

        let store = open_rule_store(&config).unwrap();
        store
            .create(NewRule::new(SourcePattern::exact("/a"), Action::redirect("/b", 301)))
            .unwrap();
        store.flush().unwrap();

        let reopened = open_rule_store(&config).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_corrupt_rule_file_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, "not json").unwrap();

        let mut config = RedirectConfig::default();
        config.rules.file = Some(path);
        assert!(matches!(open_rule_store(&config), Err(StoreError::Serde(_))));
    }
}
