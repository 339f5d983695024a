//! The immutable per-request value the pipeline resolves.
//!
//! # Responsibilities
//! - Capture scheme, host, raw URL, method and headers once at entry
//! - Derive the client IP, honouring `X-Forwarded-For` from trusted peers only
//! - Carry a request ID (inbound `x-request-id` or a fresh UUID v4)

use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method};
use std::net::{IpAddr, SocketAddr};
use url::Url;
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// One request as seen by the resolution pipeline.
#[derive(Debug, Clone)]
pub struct RedirectRequest {
    request_id: String,
    method: Method,
    scheme: String,
    host: String,
    raw_url: String,
    client_ip: Option<IpAddr>,
    headers: HeaderMap,
}

impl RedirectRequest {
    /// Build from an absolute URL, mainly for tests and tools.
    pub fn new(method: Method, url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let host = match parsed.port() {
            Some(port) => format!("{}:{}", parsed.host_str()?, port),
            None => parsed.host_str()?.to_string(),
        };
        // Keep the path exactly as written; `Url` would normalise escapes.
        let after_scheme = &url[url.find("://")? + 3..];
        let raw_url = match after_scheme.find('/') {
            Some(i) => after_scheme[i..].split('#').next().unwrap_or("/").to_string(),
            None => "/".to_string(),
        };

        Some(Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            scheme: parsed.scheme().to_string(),
            host,
            raw_url,
            client_ip: None,
            headers: HeaderMap::new(),
        })
    }

    /// Shorthand for a GET request.
    pub fn get(url: &str) -> Option<Self> {
        Self::new(Method::GET, url)
    }

    /// Build from the head of an inbound HTTP request.
    pub fn from_parts(parts: &Parts, peer: Option<SocketAddr>, trusted_proxies: &[IpAddr]) -> Self {
        let headers = parts.headers.clone();
        let peer_ip = peer.map(|addr| addr.ip());
        let trusted = peer_ip.is_some_and(|ip| trusted_proxies.contains(&ip));

        let forwarded = |name: &str| -> Option<String> {
            if !trusted {
                return None;
            }
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let scheme = forwarded("x-forwarded-proto")
            .or_else(|| parts.uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string())
            .to_ascii_lowercase();

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let client_ip = forwarded("x-forwarded-for")
            .and_then(|v| v.parse().ok())
            .or(peer_ip);

        let raw_url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            method: parts.method.clone(),
            scheme,
            host,
            raw_url,
            client_ip,
            headers,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host header value, with port when one was sent.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path and query exactly as received.
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// The full requested URL.
    pub fn full_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.raw_url)
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT.as_str())
    }

    pub fn referrer(&self) -> Option<&str> {
        self.header(header::REFERER.as_str())
    }

    /// Value of a cookie sent with the request.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Language tags from `Accept-Language`, in the order sent, lowercased.
    pub fn languages(&self) -> Vec<String> {
        self.header(header::ACCEPT_LANGUAGE.as_str())
            .map(|v| {
                v.split(',')
                    .filter_map(|part| part.split(';').next())
                    .map(|tag| tag.trim().to_ascii_lowercase())
                    .filter(|tag| !tag.is_empty() && tag != "*")
                    .collect()
            })
            .unwrap_or_default()
    }
}
