//! Tracing integration for token refresh.
//!
//! Spans are opt-in through [`RefreshConfig::tracing`](crate::RefreshConfig).
//! Log events are always emitted through `tracing` and filtered by the
//! subscriber the application installs.

mod spans;

pub use spans::{RefreshSpans, record_error};
