//! Relocation and scheme/host normalization.

use url::Url;

use crate::canonical::{comparable_host, port_suffix};
use crate::config::{CanonicalConfig, PreferredDomain};

/// The parts of a request the canonical resolver looks at.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalRequest<'a> {
    /// "http" or "https".
    pub scheme: &'a str,
    /// Host header value, possibly with a port.
    pub host: &'a str,
    /// Path plus query, as received.
    pub path_and_query: &'a str,
}

impl CanonicalRequest<'_> {
    fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    /// The URL as the client asked for it, host lowercased.
    pub fn current_url(&self) -> String {
        format!(
            "{}://{}{}",
            self.scheme.to_ascii_lowercase(),
            self.host.to_ascii_lowercase(),
            self.path_and_query
        )
    }
}

/// A terminal redirect to the canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRedirect {
    pub target: String,
    pub status: u16,
}

/// Parsed `canonical.relocate` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationTarget {
    scheme: String,
    /// Lowercased host, with port when one was configured.
    host: String,
}

impl RelocationTarget {
    /// Accepts either a bare host ("new.example.com", https implied) or an
    /// origin URL ("http://new.example.com:8080/").
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.contains("://") {
            let url = Url::parse(raw).ok()?;
            if !matches!(url.scheme(), "http" | "https") || url.path() != "/" {
                return None;
            }
            if url.query().is_some() || url.fragment().is_some() {
                return None;
            }
            let host = url.host_str()?.to_ascii_lowercase();
            let host = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            };
            Some(Self {
                scheme: url.scheme().to_string(),
                host,
            })
        } else {
            let host = raw.trim_end_matches('/');
            url::Host::parse(crate::canonical::strip_port(host)).ok()?;
            if host.contains(['/', '?', '#', '@']) {
                return None;
            }
            Some(Self {
                scheme: "https".to_string(),
                host: host.to_ascii_lowercase(),
            })
        }
    }
}

/// Decides whether a request must move to its canonical URL before any rule runs.
#[derive(Debug, Clone)]
pub struct CanonicalResolver {
    force_https: bool,
    preferred: PreferredDomain,
    /// Comparable forms of the configured aliases.
    aliases: Vec<String>,
    site_domain: Option<String>,
    relocate: Option<RelocationTarget>,
    relocate_protected: Vec<String>,
}

impl CanonicalResolver {
    /// Build from configuration. An unparsable relocation target disables relocation.
    pub fn new(config: &CanonicalConfig) -> Self {
        let relocate = config.relocate.as_deref().and_then(|raw| {
            let parsed = RelocationTarget::parse(raw);
            if parsed.is_none() {
                tracing::warn!(relocate = %raw, "Ignoring unparsable relocation target");
            }
            parsed
        });

        Self {
            force_https: config.force_https,
            preferred: config.preferred_domain,
            aliases: config.aliases.iter().map(|a| comparable_host(a)).collect(),
            site_domain: config
                .site_domain
                .as_deref()
                .map(|s| s.trim().to_ascii_lowercase()),
            relocate,
            relocate_protected: config.relocate_protected.clone(),
        }
    }

    /// True when nothing is configured and `resolve` can never fire.
    pub fn is_noop(&self) -> bool {
        !self.force_https
            && self.preferred == PreferredDomain::None
            && self.aliases.is_empty()
            && self.relocate.is_none()
    }

    /// Returns the terminal redirect for this request, if one is needed.
    pub fn resolve(&self, req: &CanonicalRequest<'_>) -> Option<CanonicalRedirect> {
        let target = self
            .relocation_target(req)
            .or_else(|| self.normalized_target(req))?;

        if target == req.current_url() {
            return None;
        }
        Some(CanonicalRedirect {
            target,
            status: 301,
        })
    }

    fn relocation_target(&self, req: &CanonicalRequest<'_>) -> Option<String> {
        let relocate = self.relocate.as_ref()?;
        if comparable_host(req.host) == comparable_host(&relocate.host) {
            return None;
        }
        let path = req.path_and_query;
        if self
            .relocate_protected
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return None;
        }
        Some(format!("{}://{}{}", relocate.scheme, relocate.host, path))
    }

    fn normalized_target(&self, req: &CanonicalRequest<'_>) -> Option<String> {
        let host = comparable_host(req.host);
        if host.is_empty() {
            return None;
        }
        // Addresses have no www form and are never aliases.
        let named = is_domain_name(&host);
        let is_alias = named && self.aliases.iter().any(|alias| *alias == host);
        let www_change = named && self.needs_www_change(&host);
        let upgrade = self.force_https && !req.is_https();

        if !(is_alias || www_change || upgrade) {
            return None;
        }

        let (base, from_request) = match (is_alias, &self.site_domain) {
            (true, Some(site)) => (site.clone(), false),
            _ => (host, true),
        };
        let canonical_host = if named {
            self.apply_preference(&base)
        } else {
            base
        };
        let scheme = if self.force_https || req.is_https() {
            "https"
        } else {
            "http"
        };

        // A port only survives when the origin otherwise stays the same.
        let port = if from_request && !upgrade {
            port_suffix(req.host)
        } else {
            ""
        };

        Some(format!(
            "{}://{}{}{}",
            scheme, canonical_host, port, req.path_and_query
        ))
    }

    fn needs_www_change(&self, host: &str) -> bool {
        let has_www = host.starts_with("www.");
        match self.preferred {
            PreferredDomain::None => false,
            PreferredDomain::Www => !has_www,
            PreferredDomain::NoWww => has_www,
        }
    }

    fn apply_preference(&self, host: &str) -> String {
        match self.preferred {
            PreferredDomain::Www if !host.starts_with("www.") => format!("www.{}", host),
            PreferredDomain::NoWww => host.strip_prefix("www.").unwrap_or(host).to_string(),
            _ => host.to_string(),
        }
    }
}

fn is_domain_name(host: &str) -> bool {
    matches!(url::Host::parse(host), Ok(url::Host::Domain(_)))
}
