//! URL normalization ahead of rule matching.
//!
//! # Responsibilities
//! - Percent-decode the requested path and query to a fixed point
//! - Reject malformed encodings and protected (control) paths
//! - Split query strings and trailing slashes for the matcher
//!
//! # Design Decisions
//! - Decoding repeats until nothing changes, so normalizing an already
//!   normalized URL is a no-op
//! - `+` is kept literally; it is only a space in form bodies
//! - Protected prefixes are checked on the decoded form so encoded
//!   variants cannot slip past

use percent_encoding::percent_decode_str;

use crate::error::ResolveError;

/// A decoded request URL ready for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    decoded: String,
}

impl NormalizedUrl {
    /// The fully decoded path and query.
    pub fn as_str(&self) -> &str {
        &self.decoded
    }

    /// The decoded path without the query string.
    pub fn path(&self) -> &str {
        split_query(&self.decoded).0
    }

    /// The decoded query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        split_query(&self.decoded).1
    }
}

/// Decode `raw` and check it against the protected prefixes.
pub fn normalize(raw: &str, protected_prefixes: &[String]) -> Result<NormalizedUrl, ResolveError> {
    let decoded = decode_fully(raw)?;

    if !decoded.starts_with('/') {
        return Err(ResolveError::InvalidUrl(raw.to_string()));
    }

    if is_protected(&decoded, protected_prefixes) {
        return Err(ResolveError::ProtectedUrl(decoded));
    }

    Ok(NormalizedUrl { decoded })
}

/// Percent-decode until a fixed point is reached.
///
/// Only the raw input must be well-formed. A `%` produced by decoding
/// (`%25`) is data and stays literal in later rounds.
pub fn decode_fully(raw: &str) -> Result<String, ResolveError> {
    let invalid = || ResolveError::InvalidUrl(raw.to_string());
    if !escapes_well_formed(raw) {
        return Err(invalid());
    }

    let mut current = raw.to_string();
    loop {
        let next = decode_once(&current).ok_or_else(invalid)?;
        if next == current {
            return Ok(current);
        }
        // Every successful round that changes the string makes it shorter.
        current = next;
    }
}

/// Every `%` starts a two-digit hex escape.
fn escapes_well_formed(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.iter().enumerate().all(|(i, b)| {
        *b != b'%'
            || (bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit())
    })
}

/// One round of decoding. `None` for bad UTF-8 or control characters;
/// a `%` that does not start an escape is left alone.
pub(crate) fn decode_once(input: &str) -> Option<String> {
    let decoded = percent_decode_str(input).decode_utf8().ok()?;
    if decoded.chars().any(char::is_control) {
        return None;
    }
    Some(decoded.into_owned())
}

fn is_protected(decoded: &str, protected_prefixes: &[String]) -> bool {
    let lowered = decoded.to_ascii_lowercase();
    protected_prefixes.iter().any(|prefix| {
        let prefix = prefix.to_ascii_lowercase();
        lowered.starts_with(&prefix)
            || lowered == prefix.trim_end_matches('/')
    })
}

/// Split a URL into path and optional query.
pub fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

/// Remove a trailing slash, except from the root path.
pub fn strip_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}
