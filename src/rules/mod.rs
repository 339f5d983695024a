//! Redirect rules.
//!
//! # Data Flow
//! ```text
//! Decoded URL
//!     → store.rs (candidate rules, ordered by position)
//!     → matcher.rs (first rule whose predicate fires)
//!     → predicate.rs (source pattern + condition → target)
//!     → Return: RuleMatch, or no match with a page-type hint
//! ```
//!
//! # Design Decisions
//! - Position is a total order; first match wins
//! - Disabled rules are never evaluated
//! - The matcher never mutates rules; hit counters go through the store

pub mod matcher;
pub mod model;
pub mod predicate;
pub mod store;

pub use matcher::{MatchResult, RuleMatch, RuleMatcher};
pub use model::{Action, ActionKind, MatchCondition, PageType, QueryMode, Rule, SourcePattern, TextPattern};
pub use store::{BulkAction, InMemoryRuleStore, NewRule, RuleFilter, RuleStore, StoreError};
