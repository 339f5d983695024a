//! Request resolution pipeline.
//!
//! # Data Flow
//! ```text
//! RedirectRequest
//!     → canonical resolver (301 to the canonical URL? stop)
//!     → URL normalizer (invalid / protected? pass through)
//!     → rule store candidates
//!     → rule matcher (first rule by position)
//!     → response shaper (directive)
//!     → Outcome, carried by a per-request RequestLifecycle
//! ```
//!
//! # Design Decisions
//! - The order above is fixed; nothing after the canonical stage runs for a canonical redirect
//! - Errors never escape: each one folds into `Outcome::PassThrough`
//! - The resolver is immutable; a config reload builds a new one and swaps it in

pub mod lifecycle;
pub mod outcome;

pub use lifecycle::{RedirectDecision, RequestLifecycle};
pub use outcome::Outcome;

use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;

use crate::audit::{AuditLogger, LogWriter};
use crate::canonical::{CanonicalRequest, CanonicalResolver};
use crate::config::RedirectConfig;
use crate::error::ResolveError;
use crate::http::normalize::{normalize, NormalizedUrl};
use crate::http::request::RedirectRequest;
use crate::http::response::{Directive, ResponseShaper, ShapeContext};
use crate::http::transport::{select_transport, ServerEnvironment, ResponseTransport};
use crate::observability::metrics;
use crate::rules::{Rule, RuleMatch, RuleMatcher, RuleStore};

/// Result of the request-start pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub outcome: Outcome,
    /// Normalized URL, when the request got that far.
    pub url: Option<NormalizedUrl>,
    /// Page-type candidates deferred to the 404 checkpoint.
    pub page_rules: Vec<Rule>,
}

impl Resolution {
    fn pass_through() -> Self {
        Self {
            outcome: Outcome::PassThrough,
            url: None,
            page_rules: Vec::new(),
        }
    }
}

/// Everything one configuration generation needs to resolve requests.
pub struct Resolver {
    canonical: CanonicalResolver,
    matcher: RuleMatcher,
    shaper: ResponseShaper,
    transport: Arc<dyn ResponseTransport>,
    logger: AuditLogger,
    store: Arc<dyn RuleStore>,
    protected_paths: Vec<String>,
    track_hits: bool,
    trusted_proxies: Vec<IpAddr>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("canonical", &self.canonical)
            .field("transport", &self.transport.name())
            .field("protected_paths", &self.protected_paths)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(
        config: &RedirectConfig,
        store: Arc<dyn RuleStore>,
        writer: Arc<dyn LogWriter>,
        transport: Arc<dyn ResponseTransport>,
    ) -> Self {
        let settings = &config.redirects;
        Self {
            canonical: CanonicalResolver::new(&config.canonical),
            matcher: RuleMatcher,
            shaper: ResponseShaper::new(settings.cache, settings.agent_name.clone()),
            transport,
            logger: AuditLogger::new(config.audit.clone(), settings.agent_name.clone(), writer),
            store,
            protected_paths: settings.protected_paths.clone(),
            track_hits: settings.track_hits,
            trusted_proxies: config.listener.trusted_proxies.clone(),
        }
    }

    /// Like [`Resolver::new`], picking the transport from the process environment.
    pub fn from_config(
        config: &RedirectConfig,
        store: Arc<dyn RuleStore>,
        writer: Arc<dyn LogWriter>,
    ) -> Self {
        let transport = select_transport(
            config.redirects.transport,
            &ServerEnvironment::from_env(),
            &config.redirects.immediate_proxies,
        );
        Self::new(config, store, writer, transport)
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    pub fn logger(&self) -> &AuditLogger {
        &self.logger
    }

    pub fn shaper(&self) -> &ResponseShaper {
        &self.shaper
    }

    pub fn transport(&self) -> &Arc<dyn ResponseTransport> {
        &self.transport
    }

    pub fn trusted_proxies(&self) -> &[IpAddr] {
        &self.trusted_proxies
    }

    /// Run the request-start pass. Always returns a definite outcome.
    pub fn resolve(&self, request: &RedirectRequest) -> Resolution {
        let resolution = match self.try_resolve(request) {
            Ok(resolution) => resolution,
            Err(ResolveError::Persistence(e)) => {
                tracing::warn!(
                    request_id = %request.request_id(),
                    error = %e,
                    "Rule store unavailable, passing request through"
                );
                Resolution::pass_through()
            }
            Err(e) => {
                tracing::debug!(
                    request_id = %request.request_id(),
                    reason = %e,
                    "Passing request through"
                );
                Resolution::pass_through()
            }
        };
        metrics::record_request(resolution.outcome.label());
        resolution
    }

    /// Resolve `request` and wrap the result in its lifecycle handle.
    pub fn begin(self: &Arc<Self>, request: RedirectRequest) -> Arc<RequestLifecycle> {
        let resolution = self.resolve(&request);
        Arc::new(RequestLifecycle::new(self.clone(), request, resolution))
    }

    fn try_resolve(&self, request: &RedirectRequest) -> Result<Resolution, ResolveError> {
        let canonical_request = CanonicalRequest {
            scheme: request.scheme(),
            host: request.host(),
            path_and_query: request.raw_url(),
        };
        if let Some(redirect) = self.canonical.resolve(&canonical_request) {
            tracing::info!(
                request_id = %request.request_id(),
                outcome = "canonical",
                from = %canonical_request.current_url(),
                to = %redirect.target,
                status = redirect.status,
                "Canonical redirect"
            );
            return Ok(Resolution {
                outcome: Outcome::Canonical {
                    target: redirect.target,
                    status: redirect.status,
                },
                url: None,
                page_rules: Vec::new(),
            });
        }

        let url = normalize(request.raw_url(), &self.protected_paths)?;

        if !self.store.has_enabled_rules()? {
            return Err(ResolveError::ConfigurationMissing("no enabled rules"));
        }

        let candidates = self.store.get_candidates(url.as_str())?;
        let result = self.matcher.find_match(request, &url, candidates);

        let outcome = match &result.matched {
            Some(matched) => Outcome::Matched {
                rule_id: matched.rule.id,
                directive: self.apply_match(request, matched, ShapeContext::now()),
            },
            None => Outcome::NotFound {
                page_type_hint: result.page_type_hint,
            },
        };

        Ok(Resolution {
            outcome,
            url: Some(url),
            page_rules: result.page_rules,
        })
    }

    /// Count the hit and shape the rule's action.
    pub(crate) fn apply_match(
        &self,
        request: &RedirectRequest,
        matched: &RuleMatch,
        ctx: ShapeContext,
    ) -> Directive {
        if self.track_hits {
            if let Err(e) = self.store.record_hit(matched.rule.id, Utc::now()) {
                tracing::warn!(
                    request_id = %request.request_id(),
                    rule_id = matched.rule.id,
                    error = %e,
                    "Failed to record rule hit"
                );
            }
        }
        metrics::record_rule_hit(matched.rule.action.kind.tag());
        self.shaper.shape(matched, ctx)
    }

    pub(crate) fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }
}
