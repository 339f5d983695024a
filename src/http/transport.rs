//! Response transports.
//!
//! Some deployment environments mangle or buffer headers. The transport
//! decides how a shaped response reaches the client:
//!
//! - `Standard`: status code and headers as shaped
//! - `Cgi`: FastCGI/IIS also need a `Status:` header carrying the status line
//! - `Immediate`: FastCGI behind certain reverse proxies; only status and
//!   `Location` are sent, the connection is closed, and no later hook may
//!   touch the response

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::Response;
use std::sync::Arc;

use crate::config::TransportMode;
use crate::http::response::{status_line, ShapedResponse};

/// Writes a shaped response for one environment.
pub trait ResponseTransport: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn render(&self, shaped: ShapedResponse) -> Response;

    /// Whether the send-headers checkpoint may still run on our responses.
    fn allows_header_hooks(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTransport;

impl ResponseTransport for StandardTransport {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn render(&self, shaped: ShapedResponse) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = shaped.status;
        *response.headers_mut() = shaped.headers;
        response
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CgiTransport;

impl ResponseTransport for CgiTransport {
    fn name(&self) -> &'static str {
        "cgi"
    }

    fn render(&self, shaped: ShapedResponse) -> Response {
        let line = status_line(shaped.status);
        let mut response = StandardTransport.render(shaped);
        if let Ok(value) = HeaderValue::from_str(&line) {
            response
                .headers_mut()
                .insert(HeaderName::from_static("status"), value);
        }
        response
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateTransport;

impl ResponseTransport for ImmediateTransport {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn render(&self, shaped: ShapedResponse) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = shaped.status;
        let headers = response.headers_mut();
        if let Some(location) = shaped.headers.get(header::LOCATION) {
            headers.insert(header::LOCATION, location.clone());
        }
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        response
    }

    fn allows_header_hooks(&self) -> bool {
        false
    }
}

/// The environment variables transport detection looks at.
#[derive(Debug, Clone, Default)]
pub struct ServerEnvironment {
    pub server_software: Option<String>,
    pub gateway_interface: Option<String>,
}

impl ServerEnvironment {
    pub fn from_env() -> Self {
        Self {
            server_software: std::env::var("SERVER_SOFTWARE").ok(),
            gateway_interface: std::env::var("GATEWAY_INTERFACE").ok(),
        }
    }

    fn is_cgi(&self) -> bool {
        let iis = self
            .server_software
            .as_deref()
            .is_some_and(|s| s.contains("Microsoft-IIS"));
        let cgi = self
            .gateway_interface
            .as_deref()
            .is_some_and(|g| g.starts_with("CGI/"));
        iis || cgi
    }

    fn behind_proxy(&self, proxies: &[String]) -> bool {
        let Some(software) = self.server_software.as_deref() else {
            return false;
        };
        let software = software.to_ascii_lowercase();
        proxies
            .iter()
            .any(|p| software.contains(&p.to_ascii_lowercase()))
    }
}

/// Pick the transport for `mode`, inspecting the environment when `Auto`.
pub fn select_transport(
    mode: TransportMode,
    env: &ServerEnvironment,
    immediate_proxies: &[String],
) -> Arc<dyn ResponseTransport> {
    let selected: Arc<dyn ResponseTransport> = match mode {
        TransportMode::Standard => Arc::new(StandardTransport),
        TransportMode::Cgi => Arc::new(CgiTransport),
        TransportMode::Immediate => Arc::new(ImmediateTransport),
        TransportMode::Auto if env.is_cgi() && env.behind_proxy(immediate_proxies) => {
            Arc::new(ImmediateTransport)
        }
        TransportMode::Auto if env.is_cgi() => Arc::new(CgiTransport),
        TransportMode::Auto => Arc::new(StandardTransport),
    };
    tracing::debug!(mode = ?mode, transport = selected.name(), "Response transport selected");
    selected
}
