//! Structured span definitions for refresh rounds.

use tracing::{Level, Span, field, span};

/// Span factory for the phases of a token request.
///
/// When disabled every method returns [`Span::none`], so instrumenting with it
/// never changes control flow.
#[derive(Clone, Copy, Debug, Default)]
pub struct RefreshSpans {
    enabled: bool,
}

impl RefreshSpans {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Wraps one connection-setup hook invocation.
    pub fn before_connect(&self, endpoint: &str) -> Span {
        if !self.enabled {
            return Span::none();
        }
        span!(
            Level::INFO,
            "iam.before_connect",
            endpoint = endpoint,
            otel.name = "iam.before_connect",
            error = field::Empty,
        )
    }

    /// Wraps a stale-path caller while it joins and waits on a round.
    ///
    /// `round` and `elected` are recorded once the caller has joined.
    pub fn needs_refresh(&self) -> Span {
        if !self.enabled {
            return Span::none();
        }
        span!(
            Level::INFO,
            "iam.needs_refresh",
            round = field::Empty,
            elected = field::Empty,
            otel.name = "iam.needs_refresh",
            error = field::Empty,
        )
    }

    /// Wraps the single fetch of a round.
    ///
    /// The fetch outlives any one caller, so the span is a root; callers link
    /// to it with `follows_from`.
    pub fn get_token(&self, round: u64, source: &str) -> Span {
        if !self.enabled {
            return Span::none();
        }
        span!(
            parent: None,
            Level::INFO,
            "iam.get_token",
            round = round,
            source = source,
            otel.name = "iam.get_token",
            error = field::Empty,
            duration_ms = field::Empty,
        )
    }
}

/// Annotate a span with the error of a failed phase.
pub fn record_error(span: &Span, error: &crate::Error) {
    span.record("error", field::display(error));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_spans_are_none() {
        let spans = RefreshSpans::disabled();
        assert!(!spans.is_enabled());
        assert!(spans.before_connect("db:5432").is_none());
        assert!(spans.needs_refresh().is_none());
        assert!(spans.get_token(1, "static").is_none());
    }

    #[test]
    fn test_record_error_on_none_span_is_noop() {
        let span = RefreshSpans::disabled().get_token(1, "static");
        record_error(&span, &crate::Error::Cancelled);
    }
}
