//! Span utilities for request resolution.

use tracing::{info_span, Span};

/// Extension trait for recording an operation result into a span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for resolution spans.
pub struct ResolveSpan;

impl ResolveSpan {
    /// Create a span for resolving `model` at `requested_version` (0 = default).
    ///
    /// `version`, `status` and `error.message` are filled in on completion.
    pub fn new(model: &str, requested_version: u64) -> Span {
        info_span!(
            "resolve_request",
            model = %model,
            requested_version,
            version = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
