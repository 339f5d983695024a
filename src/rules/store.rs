//! Rule storage.
//!
//! The resolution core only reads candidates and bumps hit counters; the
//! mutation operations exist for the management surface.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::rules::model::{match_key_for, Action, ActionKind, MatchCondition, Rule, SourcePattern};

/// Errors from rule storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rule {0} not found")]
    NotFound(u64),

    #[error("invalid rule: {0}")]
    Invalid(String),

    #[error("rule file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rule file format error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Fields supplied when creating or replacing a rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewRule {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub source: SourcePattern,
    #[serde(default)]
    pub condition: MatchCondition,
    pub action: Action,
}

fn default_true() -> bool {
    true
}

impl NewRule {
    pub fn new(source: SourcePattern, action: Action) -> Self {
        Self {
            position: None,
            enabled: true,
            group: None,
            title: None,
            source,
            condition: MatchCondition::Url,
            action,
        }
    }

    /// Reject rules that could never do anything sensible.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.source.url.is_empty() {
            return Err(StoreError::Invalid("source url is empty".into()));
        }
        if self.source.regex && self.source.compiled().is_none() {
            return Err(StoreError::Invalid(format!(
                "source regex '{}' does not compile",
                self.source.url
            )));
        }
        if !self.source.regex && !self.source.url.starts_with('/') {
            return Err(StoreError::Invalid("source url must start with '/'".into()));
        }

        let action = &self.action;
        match action.kind {
            ActionKind::Redirect => {
                if !matches!(action.code, 301 | 302 | 303 | 304 | 307 | 308) {
                    return Err(StoreError::Invalid(format!(
                        "{} is not a redirect code",
                        action.code
                    )));
                }
            }
            ActionKind::Error => {
                if !(400..600).contains(&action.code) {
                    return Err(StoreError::Invalid(format!(
                        "{} is not an error code",
                        action.code
                    )));
                }
            }
            ActionKind::Pass if self.condition.is_page_type() => {
                return Err(StoreError::Invalid(
                    "pass action cannot run after the host rendered a page".into(),
                ));
            }
            ActionKind::Pass | ActionKind::Nothing => {}
        }
        if action.kind.needs_target()
            && action.target.is_none()
            && action.unmatched_target.is_none()
        {
            return Err(StoreError::Invalid(format!(
                "{} action needs a target",
                action.kind.tag()
            )));
        }
        Ok(())
    }
}

/// Sort key for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    Url,
    Hits,
    LastAccess,
    #[default]
    Position,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Listing filter and order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuleFilter {
    /// "enabled" or "disabled".
    pub status: Option<String>,
    /// Action kind tag.
    pub action: Option<String>,
    /// Match condition tag.
    #[serde(rename = "match")]
    pub match_type: Option<String>,
    pub code: Option<u16>,
    pub group: Option<String>,
    /// Substring of the source URL.
    pub url: Option<String>,
    pub orderby: OrderBy,
    pub direction: Direction,
}

impl RuleFilter {
    fn accepts(&self, rule: &Rule) -> bool {
        let status_ok = match self.status.as_deref() {
            Some("enabled") => rule.enabled,
            Some("disabled") => !rule.enabled,
            _ => true,
        };
        status_ok
            && self.action.as_deref().map_or(true, |a| a == rule.action.kind.tag())
            && self.match_type.as_deref().map_or(true, |m| m == rule.condition.tag())
            && self.code.map_or(true, |c| c == rule.action.code)
            && self.group.as_deref().map_or(true, |g| g == rule.group)
            && self.url.as_deref().map_or(true, |u| rule.source.url.contains(u))
    }

    fn compare(&self, a: &Rule, b: &Rule) -> CmpOrdering {
        let ordering = match self.orderby {
            OrderBy::Url => a.source.url.cmp(&b.source.url),
            OrderBy::Hits => a.hits.cmp(&b.hits),
            OrderBy::LastAccess => a.last_access.cmp(&b.last_access),
            OrderBy::Position => a.order_key().cmp(&b.order_key()),
            OrderBy::Id => a.id.cmp(&b.id),
        }
        .then(a.id.cmp(&b.id));
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// Bulk operations over a list of ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Delete,
    Enable,
    Disable,
    Reset,
}

/// Access to the ordered rule set.
pub trait RuleStore: Send + Sync {
    /// Enabled rules that could match `decoded_url`, in evaluation order.
    fn get_candidates(&self, decoded_url: &str) -> Result<Vec<Rule>, StoreError>;

    fn get_by_id(&self, id: u64) -> Result<Option<Rule>, StoreError>;

    /// Whether any rule is enabled at all.
    fn has_enabled_rules(&self) -> Result<bool, StoreError>;

    /// Best-effort hit counter bump.
    fn record_hit(&self, id: u64, at: DateTime<Utc>) -> Result<(), StoreError>;

    fn create(&self, rule: NewRule) -> Result<Rule, StoreError>;

    fn update(&self, id: u64, rule: NewRule) -> Result<Rule, StoreError>;

    fn delete(&self, id: u64) -> Result<(), StoreError>;

    fn enable(&self, id: u64) -> Result<(), StoreError>;

    fn disable(&self, id: u64) -> Result<(), StoreError>;

    /// Clear hit counters.
    fn reset(&self, id: u64) -> Result<(), StoreError>;

    fn list(&self, filter: &RuleFilter) -> Result<Vec<Rule>, StoreError>;

    /// Persist pending changes, for stores that buffer them.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Apply `action` to every id, skipping ids that fail. Returns how many succeeded.
    fn bulk(&self, action: BulkAction, ids: &[u64]) -> usize {
        ids.iter()
            .filter(|id| {
                let result = match action {
                    BulkAction::Delete => self.delete(**id),
                    BulkAction::Enable => self.enable(**id),
                    BulkAction::Disable => self.disable(**id),
                    BulkAction::Reset => self.reset(**id),
                };
                if let Err(e) = &result {
                    tracing::debug!(id = **id, error = %e, "Skipping bulk item");
                }
                result.is_ok()
            })
            .count()
    }
}

/// A concurrent in-memory rule store with optional JSON persistence.
#[derive(Debug)]
pub struct InMemoryRuleStore {
    rules: DashMap<u64, Rule>,
    next_id: AtomicU64,
    persistence_path: Option<PathBuf>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
            next_id: AtomicU64::new(1),
            persistence_path: None,
        }
    }

    /// Build a store holding `rules` as given (ids and positions kept).
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let store = Self::new();
        for rule in rules {
            store.insert(rule);
        }
        store
    }

    fn insert(&self, rule: Rule) {
        self.next_id.fetch_max(rule.id + 1, Ordering::Relaxed);
        self.rules.insert(rule.id, rule);
    }

    /// Load from a JSON file; an absent file gives an empty store bound to `path`.
    pub fn load_from_file(path: &Path) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.persistence_path = Some(path.to_path_buf());
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let rules: Vec<Rule> = serde_json::from_reader(reader)?;
            for rule in rules {
                store.insert(rule);
            }
            tracing::info!(count = store.rules.len(), path = ?path, "Loaded rules");
        }
        Ok(store)
    }

    /// Write all rules, counters included, to the bound file.
    pub fn save_to_file(&self) -> Result<(), StoreError> {
        if let Some(path) = &self.persistence_path {
            let mut rules: Vec<Rule> = self.rules.iter().map(|r| r.value().clone()).collect();
            rules.sort_by_key(|r| r.id);
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, &rules)?;
            tracing::info!(count = rules.len(), path = ?path, "Saved rules");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn next_position(&self) -> u32 {
        self.rules
            .iter()
            .map(|r| r.position + 1)
            .max()
            .unwrap_or(0)
    }

    fn modify(&self, id: u64, f: impl FnOnce(&mut Rule)) -> Result<(), StoreError> {
        let mut entry = self.rules.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(entry.value_mut());
        Ok(())
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn get_candidates(&self, decoded_url: &str) -> Result<Vec<Rule>, StoreError> {
        let key = match_key_for(decoded_url);
        let mut candidates: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| r.enabled)
            .filter(|r| r.source.match_key().map_or(true, |k| k == key))
            .map(|r| r.value().clone())
            .collect();
        candidates.sort_by_key(Rule::order_key);
        Ok(candidates)
    }

    fn get_by_id(&self, id: u64) -> Result<Option<Rule>, StoreError> {
        Ok(self.rules.get(&id).map(|r| r.value().clone()))
    }

    fn has_enabled_rules(&self) -> Result<bool, StoreError> {
        Ok(self.rules.iter().any(|r| r.enabled))
    }

    fn record_hit(&self, id: u64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.modify(id, |rule| {
            rule.hits = rule.hits.saturating_add(1);
            rule.last_access = Some(at);
        })
    }

    fn create(&self, new: NewRule) -> Result<Rule, StoreError> {
        new.validate()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rule = Rule {
            id,
            position: new.position.unwrap_or_else(|| self.next_position()),
            enabled: new.enabled,
            group: new.group.unwrap_or_else(|| "default".to_string()),
            title: new.title,
            source: new.source,
            condition: new.condition,
            action: new.action,
            hits: 0,
            last_access: None,
        };
        self.rules.insert(id, rule.clone());
        Ok(rule)
    }

    fn update(&self, id: u64, new: NewRule) -> Result<Rule, StoreError> {
        new.validate()?;
        let mut entry = self.rules.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let rule = entry.value_mut();
        if let Some(position) = new.position {
            rule.position = position;
        }
        if let Some(group) = new.group {
            rule.group = group;
        }
        rule.enabled = new.enabled;
        rule.title = new.title;
        rule.source = new.source;
        rule.condition = new.condition;
        rule.action = new.action;
        Ok(rule.clone())
    }

    fn delete(&self, id: u64) -> Result<(), StoreError> {
        self.rules
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    fn enable(&self, id: u64) -> Result<(), StoreError> {
        self.modify(id, |rule| rule.enabled = true)
    }

    fn disable(&self, id: u64) -> Result<(), StoreError> {
        self.modify(id, |rule| rule.enabled = false)
    }

    fn reset(&self, id: u64) -> Result<(), StoreError> {
        self.modify(id, |rule| {
            rule.hits = 0;
            rule.last_access = None;
        })
    }

    fn list(&self, filter: &RuleFilter) -> Result<Vec<Rule>, StoreError> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| filter.accepts(r.value()))
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| filter.compare(a, b));
        Ok(rules)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.save_to_file()
    }
}
