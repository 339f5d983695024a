//! The terminal decision for one request.

use crate::http::response::Directive;

/// Exactly one of these is computed per request, once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A rule fired. Blocks the 404 and external-redirect checkpoints.
    Matched { rule_id: u64, directive: Directive },
    /// Scheme/host normalization redirect; rules were never consulted.
    Canonical { target: String, status: u16 },
    /// No rule fired. The hint is set when a page-type rule was a candidate.
    NotFound { page_type_hint: bool },
    /// Invalid or protected URL, or nothing configured.
    PassThrough,
}

impl Outcome {
    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Matched { .. } => "matched",
            Outcome::Canonical { .. } => "canonical",
            Outcome::NotFound { .. } => "not_found",
            Outcome::PassThrough => "pass_through",
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Outcome::Matched { .. })
    }

    /// The matched rule's directive, if any.
    pub fn directive(&self) -> Option<&Directive> {
        match self {
            Outcome::Matched { directive, .. } => Some(directive),
            _ => None,
        }
    }
}
