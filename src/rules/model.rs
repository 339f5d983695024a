//! Rule data model.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::OnceLock;

use crate::http::normalize::{decode_fully, split_query, strip_trailing_slash};

/// How the query string takes part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Query parameters must match as an unordered set.
    #[default]
    Exact,
    /// The query string is ignored.
    Ignore,
    /// Ignored for matching and appended to the target.
    Pass,
}

/// The source URL side of a rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcePattern {
    /// Source path (with optional query) or a regular expression.
    pub url: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub ignore_trailing_slash: bool,
    #[serde(default)]
    pub query: QueryMode,
    #[serde(skip)]
    compiled: OnceLock<Option<Regex>>,
}

impl SourcePattern {
    /// A plain, case-sensitive source URL.
    pub fn exact(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            regex: false,
            case_insensitive: false,
            ignore_trailing_slash: false,
            query: QueryMode::Exact,
            compiled: OnceLock::new(),
        }
    }

    /// A regular expression source.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            regex: true,
            ..Self::exact(pattern)
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self.compiled = OnceLock::new();
        self
    }

    pub fn ignore_trailing_slash(mut self) -> Self {
        self.ignore_trailing_slash = true;
        self
    }

    pub fn with_query(mut self, query: QueryMode) -> Self {
        self.query = query;
        self
    }

    /// The compiled regex, or `None` for plain sources and invalid patterns.
    pub fn compiled(&self) -> Option<&Regex> {
        if !self.regex {
            return None;
        }
        self.compiled
            .get_or_init(|| {
                match RegexBuilder::new(&self.url)
                    .case_insensitive(self.case_insensitive)
                    .build()
                {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %self.url, error = %e, "Invalid rule regex, rule will never match");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Candidate pre-filter key: lowercased path without query or trailing slash.
    /// Regex sources have none and are always candidates.
    pub fn match_key(&self) -> Option<String> {
        if self.regex {
            return None;
        }
        Some(match_key_for(&self.url))
    }
}

/// Pre-filter key for a request or source URL.
pub fn match_key_for(url: &str) -> String {
    let decoded = decode_fully(url).unwrap_or_else(|_| url.to_string());
    let (path, _) = split_query(&decoded);
    strip_trailing_slash(path).to_lowercase()
}

/// Page types the host can report when it renders a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    NotFound,
}

/// A text test on some request attribute.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextPattern {
    pub pattern: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(skip)]
    compiled: OnceLock<Option<Regex>>,
}

impl TextPattern {
    /// Compared case-insensitively against the whole value.
    pub fn plain(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            regex: false,
            compiled: OnceLock::new(),
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            regex: true,
            ..Self::plain(pattern)
        }
    }

    /// The compiled regex, built on first use. `None` for plain and invalid patterns.
    pub fn compiled(&self) -> Option<&Regex> {
        if !self.regex {
            return None;
        }
        self.compiled
            .get_or_init(|| match Regex::new(&self.pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %self.pattern, error = %e, "Invalid condition regex, condition will never match");
                    None
                }
            })
            .as_ref()
    }

    /// Plain patterns compare case-insensitively; regex patterns as written.
    pub fn is_match(&self, value: &str) -> bool {
        if self.regex {
            self.compiled().is_some_and(|re| re.is_match(value))
        } else {
            self.pattern.eq_ignore_ascii_case(value)
        }
    }
}

/// The match predicate type tag and its condition data.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchCondition {
    /// Source URL only.
    #[default]
    Url,
    Referrer(TextPattern),
    Agent(TextPattern),
    Header {
        name: String,
        #[serde(flatten)]
        value: TextPattern,
    },
    Cookie {
        name: String,
        #[serde(flatten)]
        value: TextPattern,
    },
    Ip {
        addresses: Vec<IpAddr>,
    },
    Server {
        host: String,
    },
    Language {
        languages: Vec<String>,
    },
    /// Fires when the host renders the given page type.
    Page {
        page: PageType,
    },
}

impl MatchCondition {
    /// Stable tag name, used by the admin filter.
    pub fn tag(&self) -> &'static str {
        match self {
            MatchCondition::Url => "url",
            MatchCondition::Referrer(_) => "referrer",
            MatchCondition::Agent(_) => "agent",
            MatchCondition::Header { .. } => "header",
            MatchCondition::Cookie { .. } => "cookie",
            MatchCondition::Ip { .. } => "ip",
            MatchCondition::Server { .. } => "server",
            MatchCondition::Language { .. } => "language",
            MatchCondition::Page { .. } => "page",
        }
    }

    pub fn is_page_type(&self) -> bool {
        matches!(self, MatchCondition::Page { .. })
    }
}

/// What a matched rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Redirect to the target.
    Redirect,
    /// Serve the target path internally without redirecting.
    Pass,
    /// Serve the action code (404, 410, ...) with no target.
    Error,
    /// Do nothing and suppress logging for this request.
    Nothing,
}

impl ActionKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ActionKind::Redirect => "redirect",
            ActionKind::Pass => "pass",
            ActionKind::Error => "error",
            ActionKind::Nothing => "nothing",
        }
    }

    /// Whether this action uses a target URL.
    pub fn needs_target(&self) -> bool {
        matches!(self, ActionKind::Redirect | ActionKind::Pass)
    }
}

/// The action side of a rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Action {
    pub kind: ActionKind,
    #[serde(default = "default_code")]
    pub code: u16,
    /// Target when the condition holds.
    #[serde(default)]
    pub target: Option<String>,
    /// Target when the URL matched but the condition did not.
    #[serde(default)]
    pub unmatched_target: Option<String>,
}

fn default_code() -> u16 {
    301
}

impl Action {
    pub fn redirect(target: impl Into<String>, code: u16) -> Self {
        Self {
            kind: ActionKind::Redirect,
            code,
            target: Some(target.into()),
            unmatched_target: None,
        }
    }

    pub fn pass(target: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Pass,
            code: 200,
            target: Some(target.into()),
            unmatched_target: None,
        }
    }

    pub fn error(code: u16) -> Self {
        Self {
            kind: ActionKind::Error,
            code,
            target: None,
            unmatched_target: None,
        }
    }

    pub fn nothing() -> Self {
        Self {
            kind: ActionKind::Nothing,
            code: 0,
            target: None,
            unmatched_target: None,
        }
    }

    pub fn with_unmatched_target(mut self, target: impl Into<String>) -> Self {
        self.unmatched_target = Some(target.into());
        self
    }
}

fn default_group() -> String {
    "default".to_string()
}

fn default_enabled() -> bool {
    true
}

/// A stored match-predicate/action pair with position-based priority.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Rule {
    pub id: u64,
    #[serde(default)]
    pub position: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default)]
    pub title: Option<String>,
    pub source: SourcePattern,
    #[serde(default)]
    pub condition: MatchCondition,
    pub action: Action,
    #[serde(default)]
    pub hits: u64,
    #[serde(default)]
    pub last_access: Option<DateTime<Utc>>,
}

impl Rule {
    /// An enabled URL rule in the default group.
    pub fn new(id: u64, position: u32, source: SourcePattern, action: Action) -> Self {
        Self {
            id,
            position,
            enabled: true,
            group: default_group(),
            title: None,
            source,
            condition: MatchCondition::Url,
            action,
            hits: 0,
            last_access: None,
        }
    }

    pub fn with_condition(mut self, condition: MatchCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Evaluation order: position, then id.
    pub fn order_key(&self) -> (u32, u64) {
        (self.position, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_key() {
        assert_eq!(SourcePattern::exact("/Old/?a=1").match_key().unwrap(), "/old");
        assert!(SourcePattern::regex("^/old/(.*)").match_key().is_none());
    }

    #[test]
    fn test_invalid_regex_compiles_to_none() {
        assert!(SourcePattern::regex("(unclosed").compiled().is_none());
        assert!(SourcePattern::regex("^/ok$").compiled().is_some());
    }

    #[test]
    fn test_condition_regex_is_compiled_once() {
        let agent = TextPattern::regex("bot|crawler");
        assert!(agent.is_match("Googlebot/2.1"));
        let first = agent.compiled().unwrap() as *const Regex;
        assert!(!agent.is_match("Mozilla/5.0"));
        assert_eq!(agent.compiled().unwrap() as *const Regex, first);

        let broken = TextPattern::regex("(unclosed");
        assert!(!broken.is_match("(unclosed"));
        assert!(broken.compiled().is_none());

        let plain = TextPattern::plain("Yes");
        assert!(plain.is_match("yes"));
        assert!(plain.compiled().is_none());
    }

    #[test]
    fn test_rule_json_shape() {
        let json = r#"{
            "id": 7,
            "position": 2,
            "source": { "url": "/old", "query": "ignore" },
            "condition": { "type": "header", "name": "x-test", "pattern": "yes" },
            "action": { "kind": "redirect", "code": 302, "target": "/new" }
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.group, "default");
        assert_eq!(rule.source.query, QueryMode::Ignore);
        assert_eq!(rule.condition.tag(), "header");
        assert_eq!(rule.action.code, 302);
    }
}
