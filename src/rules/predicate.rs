//! Evaluation of a single rule against a request.
//!
//! # Responsibilities
//! - Match the source pattern against the decoded and the raw URL
//! - Evaluate the condition and choose between the two action targets
//! - Substitute regex captures and pass query strings through
//!
//! # Design Decisions
//! - Plain sources compare query parameters as an unordered set
//! - Regex sources ignoring the query only see the path
//! - A rule whose chosen target is missing does not fire

use std::borrow::Cow;

use crate::canonical::comparable_host;
use crate::http::normalize::{split_query, strip_trailing_slash, NormalizedUrl};
use crate::http::request::RedirectRequest;
use crate::rules::model::{MatchCondition, PageType, QueryMode, Rule, SourcePattern};

/// A rule that fired, with its final target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub target: Option<String>,
}

/// Evaluate `rule`. `page` is the page type the host is rendering, if known.
pub fn evaluate(
    rule: &Rule,
    request: &RedirectRequest,
    url: &NormalizedUrl,
    page: Option<PageType>,
) -> Option<Hit> {
    let subject = source_match(&rule.source, url.as_str())
        .or_else(|| source_match(&rule.source, request.raw_url()))?;

    let holds = condition_holds(&rule.condition, request, page)?;
    let action = &rule.action;

    let chosen = if holds {
        action.target.as_deref()
    } else {
        action.unmatched_target.as_deref()
    };

    if !action.kind.needs_target() {
        return holds.then_some(Hit { target: None });
    }

    let target = chosen.filter(|t| !t.is_empty())?;
    let target = expand_target(&rule.source, subject, target);
    let target = match rule.source.query {
        QueryMode::Pass => append_query(&target, split_query(request.raw_url()).1),
        _ => target,
    };

    Some(Hit {
        target: Some(target),
    })
}

/// The subject text the source matched, or `None`.
fn source_match<'a>(source: &SourcePattern, url: &'a str) -> Option<&'a str> {
    let subject = match source.query {
        QueryMode::Exact => url,
        QueryMode::Ignore | QueryMode::Pass => split_query(url).0,
    };

    if source.regex {
        let re = source.compiled()?;
        return re.is_match(subject).then_some(subject);
    }

    let (want_path, want_query) = split_query(&source.url);
    let (got_path, got_query) = split_query(url);

    let (want_path, got_path) = if source.ignore_trailing_slash {
        (strip_trailing_slash(want_path), strip_trailing_slash(got_path))
    } else {
        (want_path, got_path)
    };

    let path_ok = if source.case_insensitive {
        want_path.to_lowercase() == got_path.to_lowercase()
    } else {
        want_path == got_path
    };
    if !path_ok {
        return None;
    }

    let query_ok = match source.query {
        QueryMode::Exact => query_pairs(want_query) == query_pairs(got_query),
        QueryMode::Ignore | QueryMode::Pass => true,
    };
    query_ok.then_some(subject)
}

fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();
    pairs.sort();
    pairs
}

/// `Some(true)` holds, `Some(false)` does not hold, `None` cannot be evaluated yet.
fn condition_holds(
    condition: &MatchCondition,
    request: &RedirectRequest,
    page: Option<PageType>,
) -> Option<bool> {
    let holds = match condition {
        MatchCondition::Url => true,
        MatchCondition::Page { page: wanted } => return page.map(|p| p == *wanted).filter(|ok| *ok),
        MatchCondition::Referrer(p) => request.referrer().is_some_and(|v| p.is_match(v)),
        MatchCondition::Agent(p) => request.user_agent().is_some_and(|v| p.is_match(v)),
        MatchCondition::Header { name, value } => request.header(name).is_some_and(|v| value.is_match(v)),
        MatchCondition::Cookie { name, value } => request.cookie(name).is_some_and(|v| value.is_match(v)),
        MatchCondition::Ip { addresses } => request
            .client_ip()
            .is_some_and(|ip| addresses.contains(&ip)),
        MatchCondition::Server { host } => comparable_host(request.host()) == comparable_host(host),
        MatchCondition::Language { languages } => {
            let sent = request.languages();
            languages.iter().any(|wanted| {
                let wanted = wanted.to_ascii_lowercase();
                sent.iter().any(|tag| {
                    *tag == wanted || tag.split('-').next() == Some(wanted.as_str())
                })
            })
        }
    };
    Some(holds)
}

fn expand_target(source: &SourcePattern, subject: &str, target: &str) -> String {
    match source.compiled() {
        Some(re) => match re.replace(subject, target) {
            // Only the matched span is replaced; keep the whole rewritten subject.
            Cow::Owned(rewritten) => rewritten,
            Cow::Borrowed(_) => target.to_string(),
        },
        None => target.to_string(),
    }
}

fn append_query(target: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(query) if target.contains('?') => format!("{}&{}", target, query),
        Some(query) => format!("{}?{}", target, query),
        None => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::normalize::normalize;
    use crate::rules::model::{Action, TextPattern};

    fn eval(rule: &Rule, url: &str) -> Option<Hit> {
        let req = RedirectRequest::get(&format!("http://example.com{}", url)).unwrap();
        let norm = normalize(req.raw_url(), &[]).unwrap();
        evaluate(rule, &req, &norm, None)
    }

    fn target(hit: Option<Hit>) -> Option<String> {
        hit.and_then(|h| h.target)
    }

    #[test]
    fn test_exact_match() {
        let rule = Rule::new(1, 0, SourcePattern::exact("/old"), Action::redirect("/new", 301));
        assert_eq!(target(eval(&rule, "/old")), Some("/new".into()));
        assert!(eval(&rule, "/old/").is_none());
        assert!(eval(&rule, "/OLD").is_none());
    }

    #[test]
    fn test_case_and_trailing_slash_flags() {
        let source = SourcePattern::exact("/Old")
            .case_insensitive()
            .ignore_trailing_slash();
        let rule = Rule::new(1, 0, source, Action::redirect("/new", 301));
        assert!(eval(&rule, "/old/").is_some());
    }

    #[test]
    fn test_matches_encoded_form() {
        let rule = Rule::new(1, 0, SourcePattern::exact("/a%20b"), Action::redirect("/c", 301));
        assert!(eval(&rule, "/a%20b").is_some());
        let decoded = Rule::new(2, 0, SourcePattern::exact("/a b"), Action::redirect("/c", 301));
        assert!(eval(&decoded, "/a%20b").is_some());
    }

    #[test]
    fn test_query_modes() {
        let exact = Rule::new(1, 0, SourcePattern::exact("/s?b=2&a=1"), Action::redirect("/t", 301));
        assert!(eval(&exact, "/s?a=1&b=2").is_some());
        assert!(eval(&exact, "/s?a=1").is_none());
        assert!(eval(&exact, "/s").is_none());

        let ignore = Rule::new(
            2,
            0,
            SourcePattern::exact("/s").with_query(QueryMode::Ignore),
            Action::redirect("/t", 301),
        );
        assert_eq!(target(eval(&ignore, "/s?x=1")), Some("/t".into()));

        let pass = Rule::new(
            3,
            0,
            SourcePattern::exact("/s").with_query(QueryMode::Pass),
            Action::redirect("/t?keep=1", 301),
        );
        assert_eq!(target(eval(&pass, "/s?x=1")), Some("/t?keep=1&x=1".into()));
    }

    #[test]
    fn test_regex_captures() {
        let rule = Rule::new(
            1,
            0,
            SourcePattern::regex("^/blog/(\\d+)/(.*)$"),
            Action::redirect("/posts/$2?id=$1", 301),
        );
        assert_eq!(
            target(eval(&rule, "/blog/42/hello")),
            Some("/posts/hello?id=42".into())
        );
        assert!(eval(&rule, "/blog/x/hello").is_none());
    }

    #[test]
    fn test_conditional_targets() {
        let rule = Rule::new(
            1,
            0,
            SourcePattern::exact("/app"),
            Action::redirect("/mobile", 302).with_unmatched_target("/desktop"),
        )
        .with_condition(MatchCondition::Agent(TextPattern::regex("iphone|android")));

        let mobile = RedirectRequest::get("http://example.com/app")
            .unwrap()
            .with_header("user-agent", "Mozilla (iPhone) android");
        let norm = normalize("/app", &[]).unwrap();
        assert_eq!(
            target(evaluate(&rule, &mobile, &norm, None)),
            Some("/mobile".into())
        );
        assert_eq!(target(eval(&rule, "/app")), Some("/desktop".into()));
    }

    #[test]
    fn test_condition_without_fallback_does_not_fire() {
        let rule = Rule::new(1, 0, SourcePattern::exact("/x"), Action::redirect("/y", 301))
            .with_condition(MatchCondition::Cookie {
                name: "beta".into(),
                value: TextPattern::plain("1"),
            });
        assert!(eval(&rule, "/x").is_none());
    }

    #[test]
    fn test_page_rules_need_page_type() {
        let rule = Rule::new(1, 0, SourcePattern::regex(".*"), Action::redirect("/search", 302))
            .with_condition(MatchCondition::Page {
                page: PageType::NotFound,
            });
        let req = RedirectRequest::get("http://example.com/missing").unwrap();
        let norm = normalize("/missing", &[]).unwrap();
        assert!(evaluate(&rule, &req, &norm, None).is_none());
        assert!(evaluate(&rule, &req, &norm, Some(PageType::NotFound)).is_some());
    }

    #[test]
    fn test_error_action_has_no_target() {
        let rule = Rule::new(1, 0, SourcePattern::exact("/gone"), Action::error(410));
        assert_eq!(eval(&rule, "/gone"), Some(Hit { target: None }));
    }
}
