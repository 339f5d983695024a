//! Response shaping for matched rules and canonical redirects.
//!
//! # Responsibilities
//! - Turn a rule action into a concrete directive (redirect, status, pass, nothing)
//! - Apply cache headers: 307 never cached, 301 follows the configured policy
//! - Render 410 as a status override without `Location`
//!
//! # Design Decisions
//! - Shaping is pure; the clock is passed in so cache expiry is testable
//! - Writing the directive to the wire belongs to the transport (transport.rs)

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use chrono::{DateTime, Duration, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::config::CachePolicy;
use crate::rules::{ActionKind, RuleMatch};

/// Response header naming the agent that issued a redirect.
pub const X_REDIRECT_BY: &str = "x-redirect-by";

const NO_CACHE_CONTROL: &str = "no-cache, must-revalidate, max-age=0";
const EXPIRED_DATE: &str = "Wed, 11 Jan 1984 05:00:00 GMT";

/// Bytes escaped in `Location`; every non-ASCII byte is escaped as well.
const LOCATION_ESCAPES: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

/// Cache headers attached to a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheHeaders {
    None,
    NoCache,
    MaxAge {
        seconds: u64,
        expires: DateTime<Utc>,
    },
}

/// What the host should do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Redirect with `Location`.
    Redirect {
        target: String,
        status: u16,
        cache: CacheHeaders,
    },
    /// Status override without `Location` (410 Gone, 404, ...).
    Status { status: u16 },
    /// Let the host serve `target` internally.
    PassThrough { target: String },
    /// Leave the request alone and suppress logging.
    Nothing,
}

impl Directive {
    /// Status code to record in the audit log.
    pub fn status(&self) -> Option<u16> {
        match self {
            Directive::Redirect { status, .. } | Directive::Status { status } => Some(*status),
            Directive::PassThrough { .. } => Some(200),
            Directive::Nothing => None,
        }
    }

    /// Target to record in the audit log.
    pub fn target(&self) -> Option<&str> {
        match self {
            Directive::Redirect { target, .. } | Directive::PassThrough { target } => Some(target),
            _ => None,
        }
    }

    /// True when the response is produced by us instead of the host.
    pub fn short_circuits(&self) -> bool {
        matches!(self, Directive::Redirect { .. } | Directive::Status { .. })
    }
}

/// Shaping inputs that vary per call.
#[derive(Debug, Clone, Copy)]
pub struct ShapeContext {
    /// Response headers were already emitted; cache policy can no longer apply.
    pub headers_sent: bool,
    pub now: DateTime<Utc>,
}

impl ShapeContext {
    pub fn now() -> Self {
        Self {
            headers_sent: false,
            now: Utc::now(),
        }
    }
}

/// Status and headers ready for a transport.
#[derive(Debug, Clone)]
pub struct ShapedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ShapedResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// Turns actions into directives and directives into status + headers.
#[derive(Debug, Clone)]
pub struct ResponseShaper {
    cache: CachePolicy,
    agent_name: String,
}

impl ResponseShaper {
    pub fn new(cache: CachePolicy, agent_name: impl Into<String>) -> Self {
        Self {
            cache,
            agent_name: agent_name.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Shape a matched rule's action.
    pub fn shape(&self, matched: &RuleMatch, ctx: ShapeContext) -> Directive {
        let action = &matched.rule.action;
        match action.kind {
            ActionKind::Redirect => match &matched.target {
                Some(target) => self.redirect(target.clone(), action.code, ctx),
                None => Directive::Nothing,
            },
            ActionKind::Error => Directive::Status {
                status: action.code,
            },
            ActionKind::Pass => match &matched.target {
                Some(target) => Directive::PassThrough {
                    target: target.clone(),
                },
                None => Directive::Nothing,
            },
            ActionKind::Nothing => Directive::Nothing,
        }
    }

    /// Shape a redirect to `target`, applying the cache rules for `status`.
    pub fn redirect(&self, target: String, status: u16, ctx: ShapeContext) -> Directive {
        if status == 410 {
            return Directive::Status { status };
        }

        let cache = match status {
            307 => CacheHeaders::NoCache,
            301 if !ctx.headers_sent => match self.cache {
                CachePolicy::NoCache => CacheHeaders::NoCache,
                CachePolicy::Default => CacheHeaders::None,
                CachePolicy::Hours(hours) => Duration::try_hours(i64::from(hours))
                    .and_then(|ttl| ctx.now.checked_add_signed(ttl))
                    .map_or(CacheHeaders::NoCache, |expires| CacheHeaders::MaxAge {
                        seconds: u64::from(hours) * 3600,
                        expires,
                    }),
            },
            _ => CacheHeaders::None,
        };

        Directive::Redirect {
            target,
            status,
            cache,
        }
    }

    /// Status and headers for a directive that short-circuits the host.
    pub fn render(&self, directive: &Directive) -> Option<ShapedResponse> {
        let mut headers = HeaderMap::new();
        let status = match directive {
            Directive::Redirect {
                target,
                status,
                cache,
            } => {
                insert(&mut headers, header::LOCATION, &location_value(target));
                insert(&mut headers, HeaderName::from_static(X_REDIRECT_BY), &self.agent_name);
                match cache {
                    CacheHeaders::None => {}
                    CacheHeaders::NoCache => {
                        insert(&mut headers, header::CACHE_CONTROL, NO_CACHE_CONTROL);
                        insert(&mut headers, header::EXPIRES, EXPIRED_DATE);
                    }
                    CacheHeaders::MaxAge { seconds, expires } => {
                        insert(
                            &mut headers,
                            header::CACHE_CONTROL,
                            &format!("max-age={}", seconds),
                        );
                        insert(&mut headers, header::EXPIRES, &http_date(*expires));
                    }
                }
                *status
            }
            Directive::Status { status } => *status,
            Directive::PassThrough { .. } | Directive::Nothing => return None,
        };

        Some(ShapedResponse {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::MOVED_PERMANENTLY),
            headers,
        })
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, value = %value, "Dropping unencodable header value"),
    }
}

/// `target` with non-ASCII text and unsafe characters percent-encoded.
pub fn location_value(target: &str) -> String {
    utf8_percent_encode(target, LOCATION_ESCAPES).to_string()
}

/// RFC 7231 IMF-fixdate.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `"410 Gone"`-style status line text.
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Action, Rule, SourcePattern};
    use chrono::TimeZone;

    fn ctx() -> ShapeContext {
        ShapeContext {
            headers_sent: false,
            now: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn matched(action: Action, target: Option<&str>) -> RuleMatch {
        RuleMatch {
            rule: Rule::new(1, 0, SourcePattern::exact("/src"), action),
            target: target.map(str::to_string),
        }
    }

    #[test]
    fn test_gone_has_no_location() {
        let shaper = ResponseShaper::new(CachePolicy::Default, "redirect-gate");
        let directive = shaper.shape(&matched(Action::error(410), None), ctx());
        assert_eq!(directive, Directive::Status { status: 410 });

        let shaped = shaper.render(&directive).unwrap();
        assert_eq!(status_line(shaped.status), "410 Gone");
        assert!(shaped.location().is_none());
    }

    #[test]
    fn test_redirect_with_410_code_becomes_gone() {
        let shaper = ResponseShaper::new(CachePolicy::Default, "redirect-gate");
        let directive = shaper.redirect("/x".into(), 410, ctx());
        assert_eq!(directive, Directive::Status { status: 410 });
    }

    #[test]
    fn test_307_is_never_cached() {
        let shaper = ResponseShaper::new(CachePolicy::Hours(24), "redirect-gate");
        let directive = shaper.shape(&matched(Action::redirect("/t", 307), Some("/t")), ctx());
        let shaped = shaper.render(&directive).unwrap();
        assert_eq!(shaped.headers[header::CACHE_CONTROL], NO_CACHE_CONTROL);
        assert_eq!(shaped.headers[header::EXPIRES], EXPIRED_DATE);
    }

    #[test]
    fn test_301_cache_policies() {
        let m = matched(Action::redirect("/t", 301), Some("/t"));

        let none = ResponseShaper::new(CachePolicy::Default, "rg");
        let shaped = none.render(&none.shape(&m, ctx())).unwrap();
        assert!(shaped.headers.get(header::CACHE_CONTROL).is_none());
        assert_eq!(shaped.location(), Some("/t"));
        assert_eq!(shaped.headers[X_REDIRECT_BY], "rg");

        let no_cache = ResponseShaper::new(CachePolicy::NoCache, "rg");
        let shaped = no_cache.render(&no_cache.shape(&m, ctx())).unwrap();
        assert_eq!(shaped.headers[header::CACHE_CONTROL], NO_CACHE_CONTROL);

        let hours = ResponseShaper::new(CachePolicy::Hours(2), "rg");
        let shaped = hours.render(&hours.shape(&m, ctx())).unwrap();
        assert_eq!(shaped.headers[header::CACHE_CONTROL], "max-age=7200");
        assert_eq!(shaped.headers[header::EXPIRES], "Fri, 01 Mar 2024 14:00:00 GMT");
    }

    #[test]
    fn test_unrepresentable_expiry_falls_back_to_no_cache() {
        let shaper = ResponseShaper::new(CachePolicy::Hours(u32::MAX), "rg");
        let m = matched(Action::redirect("/t", 301), Some("/t"));
        let shaped = shaper.render(&shaper.shape(&m, ctx())).unwrap();
        assert_eq!(shaped.headers[header::CACHE_CONTROL], NO_CACHE_CONTROL);
        assert_eq!(shaped.location(), Some("/t"));
    }

    #[test]
    fn test_location_is_ascii() {
        let shaper = ResponseShaper::new(CachePolicy::Default, "rg");
        let directive = shaper.redirect("/posts/café?q=a b".into(), 302, ctx());
        let shaped = shaper.render(&directive).unwrap();
        assert_eq!(shaped.location(), Some("/posts/caf%C3%A9?q=a%20b"));
        assert_eq!(location_value("/plain?x=1&y=%41"), "/plain?x=1&y=%41");
    }

    #[test]
    fn test_cache_policy_skipped_once_headers_sent() {
        let shaper = ResponseShaper::new(CachePolicy::Hours(2), "rg");
        let sent = ShapeContext {
            headers_sent: true,
            ..ctx()
        };
        let directive = shaper.redirect("/t".into(), 301, sent);
        assert!(matches!(
            directive,
            Directive::Redirect {
                cache: CacheHeaders::None,
                ..
            }
        ));
    }

    #[test]
    fn test_302_has_no_cache_headers() {
        let shaper = ResponseShaper::new(CachePolicy::NoCache, "rg");
        let directive = shaper.redirect("/t".into(), 302, ctx());
        assert!(matches!(
            directive,
            Directive::Redirect {
                cache: CacheHeaders::None,
                status: 302,
                ..
            }
        ));
    }

    #[test]
    fn test_pass_and_nothing_do_not_render() {
        let shaper = ResponseShaper::new(CachePolicy::Default, "rg");
        let pass = shaper.shape(&matched(Action::pass("/inner"), Some("/inner")), ctx());
        assert_eq!(
            pass,
            Directive::PassThrough {
                target: "/inner".into()
            }
        );
        assert!(shaper.render(&pass).is_none());
        assert!(shaper.render(&Directive::Nothing).is_none());
    }
}
