//! Log entry record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Which log an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Redirect,
    NotFound,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Redirect => "redirect",
            LogKind::NotFound => "not_found",
        }
    }
}

/// One append-only audit record.
///
/// Fields after `referrer` depend on the log schema version and may be
/// dropped before the entry reaches the writer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogEntry {
    pub created: DateTime<Utc>,
    pub kind: LogKind,
    pub server: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,

    // v2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<u64>,

    // v3
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_by: Option<String>,
}

impl LogEntry {
    /// An entry with only the base fields set.
    pub fn new(kind: LogKind, server: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            created: Utc::now(),
            kind,
            server: server.into(),
            url: url.into(),
            ip: None,
            agent: None,
            referrer: None,
            request_method: None,
            http_code: None,
            sent_to: None,
            rule_id: None,
            domain: None,
            request_data: None,
            redirect_by: None,
        }
    }
}

/// Zero the host part of an address: the last octet of IPv4,
/// the last 80 bits of IPv6.
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            IpAddr::V4(Ipv4Addr::new(a, b, c, 0))
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            IpAddr::V6(Ipv6Addr::new(s[0], s[1], s[2], 0, 0, 0, 0, 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymize_ipv4() {
        let ip: IpAddr = "203.0.113.77".parse().unwrap();
        assert_eq!(anonymize_ip(ip).to_string(), "203.0.113.0");
    }

    #[test]
    fn test_anonymize_ipv6() {
        let ip: IpAddr = "2001:db8:85a3:1234:5678:8a2e:370:7334".parse().unwrap();
        assert_eq!(anonymize_ip(ip).to_string(), "2001:db8:85a3::");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let entry = LogEntry::new(LogKind::NotFound, "example.com", "/missing");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert!(json.get("http_code").is_none());
        assert!(json.get("ip").is_none());
    }
}
