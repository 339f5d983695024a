//! Per-request checkpoints.
//!
//! The host reports four moments in a request's life. Each one is a method
//! on the request's [`RequestLifecycle`]:
//!
//! | host event                        | method               |
//! |-----------------------------------|----------------------|
//! | request starting                  | `start`              |
//! | about to render not-found         | `not_found`          |
//! | redirect emitted by another actor | `external_redirect`  |
//! | response headers about to be sent | `send_headers`       |
//!
//! The outcome is fixed when the handle is created. A single flag makes sure
//! at most one audit entry is written, whichever checkpoint gets there first.

use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::http::normalize::NormalizedUrl;
use crate::http::request::{RedirectRequest, X_REQUEST_ID};
use crate::http::response::{Directive, ShapeContext, X_REDIRECT_BY};
use crate::http::transport::ResponseTransport;
use crate::pipeline::outcome::Outcome;
use crate::pipeline::{Resolution, Resolver};
use crate::rules::{PageType, Rule};

/// Answer to a host handler that wants to redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectDecision {
    Allow,
    /// A pass-through rule owns this request; the redirect must not happen.
    Veto,
}

/// The resolved state of one request, shared with host handlers.
#[derive(Debug)]
pub struct RequestLifecycle {
    resolver: Arc<Resolver>,
    request: RedirectRequest,
    outcome: Outcome,
    url: Option<NormalizedUrl>,
    page_rules: Vec<Rule>,
    logged: AtomicBool,
    headers_sent: AtomicBool,
}

impl RequestLifecycle {
    pub(crate) fn new(resolver: Arc<Resolver>, request: RedirectRequest, resolution: Resolution) -> Self {
        Self {
            resolver,
            request,
            outcome: resolution.outcome,
            url: resolution.url,
            page_rules: resolution.page_rules,
            logged: AtomicBool::new(false),
            headers_sent: AtomicBool::new(false),
        }
    }

    pub fn request(&self) -> &RedirectRequest {
        &self.request
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn transport(&self) -> &Arc<dyn ResponseTransport> {
        self.resolver.transport()
    }

    /// Target the host should serve internally, for pass-through rules.
    pub fn pass_through_target(&self) -> Option<&str> {
        match self.outcome.directive() {
            Some(Directive::PassThrough { target }) => Some(target),
            _ => None,
        }
    }

    /// Request starting. Returns the response when the request ends here.
    pub fn start(&self) -> Option<Response> {
        match &self.outcome {
            Outcome::Canonical { target, status } => {
                let directive = self
                    .resolver
                    .shaper()
                    .redirect(target.clone(), *status, self.shape_context());
                self.render(&directive)
            }
            Outcome::Matched { directive, .. } => {
                self.redirect_executed();
                if directive.short_circuits() {
                    self.render(directive)
                } else {
                    None
                }
            }
            Outcome::NotFound { .. } | Outcome::PassThrough => None,
        }
    }

    /// Matched-redirect checkpoint. Returns whether an entry was written.
    pub fn redirect_executed(&self) -> bool {
        match &self.outcome {
            Outcome::Matched { rule_id, directive } => self.log_match(*rule_id, directive),
            _ => false,
        }
    }

    /// The host is about to render a not-found page. A page-type rule may
    /// replace the response; otherwise the 404 is logged.
    pub fn not_found(&self) -> Option<Response> {
        let Outcome::NotFound { page_type_hint } = self.outcome else {
            return None;
        };

        if page_type_hint {
            let url = self.url.as_ref()?;
            let matched = self.resolver.matcher().find_page_match(
                &self.request,
                url,
                &self.page_rules,
                PageType::NotFound,
            );
            if let Some(matched) = matched {
                let directive =
                    self.resolver
                        .apply_match(&self.request, &matched, self.shape_context());
                self.log_match(matched.rule.id, &directive);
                if directive.short_circuits() {
                    return self.render(&directive);
                }
            } else {
                tracing::debug!(
                    request_id = %self.request.request_id(),
                    "Not-found page owned by a page-type rule, not logged"
                );
            }
            return None;
        }

        if self.claim_log() {
            self.resolver.logger().log_not_found(&self.request);
        }
        None
    }

    /// Some other actor wants to redirect this request.
    pub fn external_redirect(&self, location: &str, status: u16, source: Option<&str>) -> RedirectDecision {
        match &self.outcome {
            Outcome::Matched {
                directive: Directive::PassThrough { target },
                ..
            } => {
                tracing::debug!(
                    request_id = %self.request.request_id(),
                    location = %location,
                    pass_target = %target,
                    "Vetoed redirect on a pass-through request"
                );
                RedirectDecision::Veto
            }
            Outcome::NotFound { .. } => {
                if self.claim_log() {
                    self.resolver
                        .logger()
                        .log_external(&self.request, location, status, source);
                }
                RedirectDecision::Allow
            }
            _ => RedirectDecision::Allow,
        }
    }

    /// Response headers are about to be sent.
    pub fn send_headers(&self, response: &mut Response) {
        self.headers_sent.store(true, Ordering::Release);
        if !self.transport().allows_header_hooks() {
            return;
        }

        let headers = response.headers_mut();
        if !headers.contains_key(X_REQUEST_ID) {
            if let Ok(value) = HeaderValue::from_str(self.request.request_id()) {
                headers.insert(HeaderName::from_static(X_REQUEST_ID), value);
            }
        }

        let ours = match &self.outcome {
            Outcome::Canonical { .. } => true,
            Outcome::Matched { directive, .. } => directive.short_circuits(),
            _ => false,
        };
        if ours && response.status().is_redirection() && !response.headers().contains_key(X_REDIRECT_BY) {
            if let Ok(value) = HeaderValue::from_str(self.resolver.shaper().agent_name()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(X_REDIRECT_BY), value);
            }
        }
    }

    /// True once any checkpoint has written (or suppressed) this request's entry.
    pub fn is_logged(&self) -> bool {
        self.logged.load(Ordering::Acquire)
    }

    fn log_match(&self, rule_id: u64, directive: &Directive) -> bool {
        if !self.claim_log() {
            return false;
        }
        match directive {
            Directive::Nothing => {
                tracing::debug!(
                    request_id = %self.request.request_id(),
                    rule_id,
                    "Logging suppressed by rule"
                );
                false
            }
            _ => self.resolver.logger().log_redirect(
                &self.request,
                Some(rule_id),
                directive.target(),
                directive.status().unwrap_or_default(),
            ),
        }
    }

    fn claim_log(&self) -> bool {
        !self.logged.swap(true, Ordering::AcqRel)
    }

    fn shape_context(&self) -> ShapeContext {
        ShapeContext {
            headers_sent: self.headers_sent.load(Ordering::Acquire),
            now: Utc::now(),
        }
    }

    fn render(&self, directive: &Directive) -> Option<Response> {
        let shaped = self.resolver.shaper().render(directive)?;
        Some(self.transport().render(shaped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{LogKind, LogWriter, MemoryLogWriter};
    use crate::config::{PreferredDomain, RedirectConfig};
    use crate::http::response::status_line;
    use crate::http::transport::{ImmediateTransport, StandardTransport};
    use crate::rules::{Action, InMemoryRuleStore, MatchCondition, RuleStore, SourcePattern};
    use axum::http::{header, StatusCode};

    struct Harness {
        resolver: Arc<Resolver>,
        writer: Arc<MemoryLogWriter>,
    }

    impl Harness {
        fn new(rules: Vec<Rule>, configure: impl FnOnce(&mut RedirectConfig)) -> Self {
            Self::with_transport(rules, configure, Arc::new(StandardTransport))
        }

        fn with_transport(
            rules: Vec<Rule>,
            configure: impl FnOnce(&mut RedirectConfig),
            transport: Arc<dyn ResponseTransport>,
        ) -> Self {
            let mut config = RedirectConfig::default();
            configure(&mut config);
            let writer = Arc::new(MemoryLogWriter::new());
            let store: Arc<dyn RuleStore> = Arc::new(InMemoryRuleStore::with_rules(rules));
            let resolver = Arc::new(Resolver::new(&config, store, writer.clone(), transport));
            Self { resolver, writer }
        }

        fn begin(&self, url: &str) -> Arc<RequestLifecycle> {
            self.resolver.begin(RedirectRequest::get(url).unwrap())
        }

        fn entries(&self, kind: LogKind) -> usize {
            self.writer.entries(Some(kind)).unwrap().len()
        }
    }

    fn old_to_new() -> Rule {
        Rule::new(1, 1, SourcePattern::exact("/old"), Action::redirect("/new", 301))
    }

    fn page_rule(action: Action) -> Rule {
        Rule::new(9, 5, SourcePattern::regex("^/.*$"), action).with_condition(MatchCondition::Page {
            page: PageType::NotFound,
        })
    }

    #[test]
    fn test_no_rules_and_no_canonical_config_logs_nothing() {
        let h = Harness::new(vec![], |_| {});
        let lifecycle = h.begin("http://example.com/missing");
        assert_eq!(lifecycle.outcome(), &Outcome::PassThrough);
        assert!(lifecycle.start().is_none());
        assert!(lifecycle.not_found().is_none());
        assert!(h.writer.entries(None).unwrap().is_empty());
    }

    #[test]
    fn test_matched_rule_logs_exactly_once() {
        let h = Harness::new(vec![old_to_new()], |_| {});
        let lifecycle = h.begin("http://example.com/old");

        let response = lifecycle.start().unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/new");

        assert!(!lifecycle.redirect_executed());
        assert!(lifecycle.not_found().is_none());
        assert_eq!(
            lifecycle.external_redirect("/elsewhere", 302, Some("plugin")),
            RedirectDecision::Allow
        );

        let entries = h.writer.entries(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogKind::Redirect);
        assert_eq!(entries[0].http_code, Some(301));
        assert_eq!(entries[0].sent_to.as_deref(), Some("/new"));
        assert_eq!(entries[0].rule_id, Some(1));
    }

    #[test]
    fn test_position_order_is_absolute() {
        let rules = vec![
            Rule::new(1, 5, SourcePattern::regex("^/old"), Action::redirect("/late", 302)),
            Rule::new(2, 2, SourcePattern::exact("/old"), Action::redirect("/early", 301)),
        ];
        let h = Harness::new(rules, |_| {});
        let lifecycle = h.begin("http://example.com/old");
        assert_eq!(
            lifecycle.outcome(),
            &Outcome::Matched {
                rule_id: 2,
                directive: Directive::Redirect {
                    target: "/early".into(),
                    status: 301,
                    cache: crate::http::response::CacheHeaders::None,
                }
            }
        );
    }

    #[test]
    fn test_not_found_logged_once_without_page_rules() {
        let h = Harness::new(vec![old_to_new()], |_| {});
        let lifecycle = h.begin("http://example.com/missing");
        assert!(lifecycle.start().is_none());
        assert!(lifecycle.not_found().is_none());
        assert!(lifecycle.not_found().is_none());
        assert_eq!(h.entries(LogKind::NotFound), 1);
    }

    #[test]
    fn test_negative_expiry_disables_not_found_logging() {
        let h = Harness::new(vec![old_to_new()], |c| c.audit.expire_404_days = -1);
        h.begin("http://example.com/missing").not_found();
        assert_eq!(h.entries(LogKind::NotFound), 0);
    }

    #[test]
    fn test_canonical_redirect_is_never_logged() {
        let h = Harness::new(vec![old_to_new()], |c| {
            c.canonical.force_https = true;
            c.canonical.preferred_domain = PreferredDomain::Www;
        });
        let lifecycle = h.begin("http://example.com/foo");
        let response = lifecycle.start().unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://www.example.com/foo"
        );
        assert!(!lifecycle.redirect_executed());
        assert!(h.writer.entries(None).unwrap().is_empty());
    }

    #[test]
    fn test_page_type_rule_suppresses_not_found_entry() {
        let h = Harness::new(vec![old_to_new(), page_rule(Action::nothing())], |_| {});
        let lifecycle = h.begin("http://example.com/missing");
        assert_eq!(
            lifecycle.outcome(),
            &Outcome::NotFound {
                page_type_hint: true
            }
        );
        assert!(lifecycle.not_found().is_none());
        assert_eq!(h.entries(LogKind::NotFound), 0);
        assert!(h.writer.entries(None).unwrap().is_empty());
    }

    #[test]
    fn test_page_type_rule_redirects_at_not_found() {
        let h = Harness::new(vec![page_rule(Action::redirect("/search", 302))], |_| {});
        let lifecycle = h.begin("http://example.com/missing");
        assert!(lifecycle.start().is_none());

        let response = lifecycle.not_found().unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/search");
        assert_eq!(h.entries(LogKind::NotFound), 0);
        assert_eq!(h.entries(LogKind::Redirect), 1);
    }

    #[test]
    fn test_gone_has_no_location() {
        let rule = Rule::new(1, 0, SourcePattern::exact("/gone"), Action::error(410));
        let h = Harness::new(vec![rule], |_| {});
        let response = h.begin("http://example.com/gone").start().unwrap();
        assert_eq!(status_line(response.status()), "410 Gone");
        assert!(!response.headers().contains_key(header::LOCATION));
        assert_eq!(h.writer.entries(None).unwrap()[0].http_code, Some(410));
    }

    #[test]
    fn test_nothing_action_suppresses_logging() {
        let rule = Rule::new(1, 0, SourcePattern::exact("/quiet"), Action::nothing());
        let h = Harness::new(vec![rule], |c| c.audit.log_external = true);
        let lifecycle = h.begin("http://example.com/quiet");
        assert!(lifecycle.start().is_none());
        assert!(lifecycle.is_logged());
        lifecycle.external_redirect("/x", 302, Some("plugin"));
        assert!(h.writer.entries(None).unwrap().is_empty());
    }

    #[test]
    fn test_pass_through_vetoes_external_redirects() {
        let rule = Rule::new(1, 0, SourcePattern::exact("/alias"), Action::pass("/real"));
        let h = Harness::new(vec![rule], |_| {});
        let lifecycle = h.begin("http://example.com/alias");
        assert!(lifecycle.start().is_none());
        assert_eq!(lifecycle.pass_through_target(), Some("/real"));
        assert_eq!(
            lifecycle.external_redirect("/other", 302, None),
            RedirectDecision::Veto
        );
        let entries = h.writer.entries(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].http_code, Some(200));
    }

    #[test]
    fn test_external_redirect_logged_when_enabled() {
        let h = Harness::new(vec![old_to_new()], |c| c.audit.log_external = true);
        let lifecycle = h.begin("http://example.com/product");
        assert_eq!(
            lifecycle.external_redirect("/shop/product", 301, Some("shop")),
            RedirectDecision::Allow
        );
        lifecycle.not_found();

        let entries = h.writer.entries(None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].redirect_by.as_deref(), Some("shop"));
        assert!(entries[0].rule_id.is_none());
    }

    #[test]
    fn test_send_headers_adds_request_id_and_agent() {
        let h = Harness::new(vec![old_to_new()], |c| c.redirects.agent_name = "gate".into());
        let lifecycle = h.begin("http://example.com/old");
        let mut response = lifecycle.start().unwrap();
        response.headers_mut().remove(X_REDIRECT_BY);
        lifecycle.send_headers(&mut response);
        assert_eq!(response.headers()[X_REDIRECT_BY], "gate");
        assert_eq!(
            response.headers()[X_REQUEST_ID],
            lifecycle.request().request_id()
        );
    }

    #[test]
    fn test_immediate_transport_skips_header_hooks() {
        let h = Harness::with_transport(vec![old_to_new()], |_| {}, Arc::new(ImmediateTransport));
        let lifecycle = h.begin("http://example.com/old");
        let mut response = lifecycle.start().unwrap();
        lifecycle.send_headers(&mut response);
        assert!(!response.headers().contains_key(X_REDIRECT_BY));
        assert!(!response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }
}
