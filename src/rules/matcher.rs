//! First-match selection over an ordered candidate set.
//!
//! # Responsibilities
//! - Walk candidates in position order, skipping disabled rules
//! - Stop at the first rule that fires
//! - Note whether a page-type rule was among the candidates
//!
//! # Design Decisions
//! - Position (then id) is a total order; candidates are re-sorted
//!   so a store returning them out of order cannot change the winner
//! - Page-type rules are deferred until the host reports a page type

use crate::http::normalize::NormalizedUrl;
use crate::http::request::RedirectRequest;
use crate::rules::model::{PageType, Rule};
use crate::rules::predicate::evaluate;

/// The winning rule and its resolved target.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule: Rule,
    pub target: Option<String>,
}

/// Result of a request-start matching pass.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub matched: Option<RuleMatch>,
    /// A page-type rule was a candidate, so a later 404 is intentional.
    pub page_type_hint: bool,
    /// Deferred page-type candidates, in evaluation order.
    pub page_rules: Vec<Rule>,
}

/// Selects the first matching rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleMatcher;

impl RuleMatcher {
    /// Evaluate URL and request-attribute rules at request start.
    pub fn find_match(
        &self,
        request: &RedirectRequest,
        url: &NormalizedUrl,
        mut candidates: Vec<Rule>,
    ) -> MatchResult {
        candidates.retain(|rule| rule.enabled);
        candidates.sort_by_key(Rule::order_key);

        let mut result = MatchResult::default();
        for rule in candidates {
            if rule.condition.is_page_type() {
                result.page_type_hint = true;
                result.page_rules.push(rule);
                continue;
            }

            if let Some(hit) = evaluate(&rule, request, url, None) {
                tracing::debug!(
                    request_id = %request.request_id(),
                    rule_id = rule.id,
                    position = rule.position,
                    "Rule matched"
                );
                result.matched = Some(RuleMatch {
                    rule,
                    target: hit.target,
                });
                return result;
            }
        }
        result
    }

    /// Evaluate deferred page-type rules once the host reports `page`.
    pub fn find_page_match(
        &self,
        request: &RedirectRequest,
        url: &NormalizedUrl,
        page_rules: &[Rule],
        page: PageType,
    ) -> Option<RuleMatch> {
        page_rules.iter().find_map(|rule| {
            evaluate(rule, request, url, Some(page)).map(|hit| RuleMatch {
                rule: rule.clone(),
                target: hit.target,
            })
        })
    }
}
