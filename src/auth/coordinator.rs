//! Single-flight refresh coordinator.
//!
//! Callers read the current [`TokenState`] snapshot without contention. When
//! the snapshot is stale, callers race for the gate: the first one installs a
//! new [`Round`] and launches its fetch, everyone else subscribes to that
//! round. The fetch writes the new snapshot, empties the gate and broadcasts
//! the outcome, in that order, so a caller that misses the broadcast always
//! finds the fresh snapshot instead.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use secrecy::SecretString;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use super::state::{IssuedToken, Round, RoundOutcome, RoundWaiter, TokenState};
use super::{CredentialSource, Endpoint, TokenBuilder};
use crate::common::SharedCell;
use crate::config::RefreshConfig;
use crate::observability::{RefreshSpans, record_error};
use crate::{Error, Result};

/// Point-in-time view of a coordinator's cache, for diagnostics.
#[derive(Clone, Debug)]
pub struct TokenSnapshot {
    /// Whether any refresh has ever succeeded.
    pub has_token: bool,
    /// Expiration of the cached token.
    pub expires_at: Option<Instant>,
    /// Error of the most recent round, cleared by the next success.
    pub last_error: Option<Error>,
    /// Rounds completed so far, successful or not.
    pub completed_rounds: u64,
    /// Whether a round is currently in flight.
    pub refreshing: bool,
}

/// Hands out a valid token to any number of concurrent callers while running
/// at most one credential fetch per staleness event.
///
/// Cloning is cheap; clones share the same cache.
#[derive(Clone)]
pub struct TokenCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Endpoint,
    source: Arc<dyn CredentialSource>,
    builder: Arc<dyn TokenBuilder>,
    config: RefreshConfig,
    spans: RefreshSpans,
    state: SharedCell<TokenState>,
    gate: Mutex<Option<Arc<Round>>>,
    rounds: AtomicU64,
}

enum Joined {
    Fresh(SecretString),
    Waiting { waiter: RoundWaiter, elected: bool },
}

impl TokenCoordinator {
    pub fn builder() -> TokenCoordinatorBuilder {
        TokenCoordinatorBuilder::default()
    }

    pub fn new(
        endpoint: Endpoint,
        source: impl CredentialSource + 'static,
        builder: impl TokenBuilder + 'static,
        config: RefreshConfig,
    ) -> Result<Self> {
        Self::builder()
            .endpoint(endpoint)
            .source(source)
            .token_builder(builder)
            .config(config)
            .build()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.inner.config
    }

    pub fn spans(&self) -> RefreshSpans {
        self.inner.spans
    }

    /// Current token, refreshing it first if it is inside the refresh window.
    ///
    /// Dropping the returned future stops this caller's wait without
    /// affecting the refresh other callers are waiting on.
    pub async fn token(&self) -> Result<SecretString> {
        self.obtain(None).await
    }

    /// Like [`token`](Self::token), returning [`Error::Cancelled`] as soon as
    /// `cancel` fires while waiting on a refresh.
    pub async fn token_with_cancel(&self, cancel: &CancellationToken) -> Result<SecretString> {
        self.obtain(Some(cancel)).await
    }

    /// Whether the next call would have to wait on a refresh.
    pub fn needs_refresh(&self) -> bool {
        self.inner
            .state
            .load()
            .needs_refresh(Instant::now(), self.inner.config.refresh_window)
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        let refreshing = self.inner.gate.lock().is_some();
        let state = self.inner.state.load();
        TokenSnapshot {
            has_token: state.issued.is_some(),
            expires_at: state.issued.as_ref().map(|issued| issued.expires_at),
            last_error: state.last_error.clone(),
            completed_rounds: state.completed_rounds,
            refreshing,
        }
    }

    async fn obtain(&self, cancel: Option<&CancellationToken>) -> Result<SecretString> {
        let window = self.inner.config.refresh_window;
        if let Some(token) = self.inner.state.load().fresh_token(Instant::now(), window) {
            tracing::trace!(endpoint = %self.inner.endpoint, "Using cached token");
            return Ok(token);
        }

        let span = self.inner.spans.needs_refresh();
        let (waiter, elected) = match span.in_scope(|| self.inner.join()) {
            Joined::Fresh(token) => return Ok(token),
            Joined::Waiting { waiter, elected } => (waiter, elected),
        };
        span.record("round", waiter.round());
        span.record("elected", elected);

        let wait = waiter.outcome().instrument(span.clone());
        let outcome = match cancel {
            Some(cancel) => {
                tokio::select! {
                    biased;
                    outcome = wait => outcome,
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                }
            }
            None => wait.await,
        };

        if let Err(e) = &outcome {
            record_error(&span, e);
        }
        outcome
    }
}

impl Inner {
    /// Join the in-flight round or start a new one. Holds the gate only for
    /// this bookkeeping.
    fn join(self: &Arc<Self>) -> Joined {
        let mut gate = self.gate.lock();

        // A round may have closed between the caller's check and the lock.
        let state = self.state.load();
        if let Some(token) = state.fresh_token(Instant::now(), self.config.refresh_window) {
            return Joined::Fresh(token);
        }

        if let Some(round) = gate.as_ref() {
            return Joined::Waiting {
                waiter: round.join(),
                elected: false,
            };
        }

        let round = Arc::new(Round::new(self.rounds.fetch_add(1, Ordering::Relaxed) + 1));
        *gate = Some(round.clone());
        drop(gate);

        tracing::debug!(
            endpoint = %self.endpoint,
            round = round.id(),
            "Token stale, starting refresh round"
        );

        let waiter = round.join();
        let span = self.spans.get_token(round.id(), self.source.name());
        span.follows_from(&Span::current());
        tokio::spawn(self.clone().run_round(round).instrument(span));

        Joined::Waiting {
            waiter,
            elected: true,
        }
    }

    async fn run_round(self: Arc<Self>, round: Arc<Round>) {
        let mut guard = RoundGuard {
            inner: self.clone(),
            round: round.clone(),
            closed: false,
        };

        let started = std::time::Instant::now();
        let outcome = self.fetch().await;

        let span = Span::current();
        span.record("duration_ms", started.elapsed().as_millis() as u64);
        if let Err(e) = &outcome {
            record_error(&span, e);
        }

        self.close(&round, outcome);
        guard.closed = true;
    }

    async fn fetch(&self) -> Result<IssuedToken> {
        let credential = self.source.retrieve().await?;

        let now = Instant::now();
        let lifetime = self.config.token_lifetime;

        // Reusing a credential that dies before the token would leave the
        // next round with the same short-lived secret.
        if credential.expires_within(lifetime) && self.source.supports_invalidation() {
            tracing::debug!(
                source = self.source.name(),
                "Source credential expires within token lifetime, invalidating"
            );
            self.source.invalidate();
        }

        let token = self.builder.build(&self.endpoint, &credential).await?;

        let expires_at = match credential.remaining() {
            Some(left) => now + left.min(lifetime),
            None => now + lifetime,
        };

        Ok(IssuedToken { token, expires_at })
    }

    /// Publish the round: snapshot first, then the gate, then the broadcast.
    fn close(&self, round: &Arc<Round>, outcome: Result<IssuedToken>) {
        let published: RoundOutcome = {
            let mut gate = self.gate.lock();

            let published = match outcome {
                Ok(issued) => {
                    let token = issued.token.clone();
                    let expires_in = issued.expires_at.saturating_duration_since(Instant::now());
                    self.state.update(|state| state.succeeded(issued));
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        round = round.id(),
                        expires_in_secs = expires_in.as_secs(),
                        "Token refreshed"
                    );
                    Ok(token)
                }
                Err(e) => {
                    self.state.update(|state| state.failed(e.clone()));
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        round = round.id(),
                        error = %e,
                        "Token refresh failed"
                    );
                    Err(e)
                }
            };

            clear_gate(&mut gate, round);
            published
        };

        round.publish(published);
    }
}

fn clear_gate(gate: &mut Option<Arc<Round>>, round: &Arc<Round>) {
    if gate.as_ref().is_some_and(|current| Arc::ptr_eq(current, round)) {
        *gate = None;
    }
}

/// Empties the gate if a round's task ends without closing it, so a panic in
/// a source or builder cannot wedge every future refresh.
struct RoundGuard {
    inner: Arc<Inner>,
    round: Arc<Round>,
    closed: bool,
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        tracing::warn!(round = self.round.id(), "Token refresh round abandoned");
        clear_gate(&mut self.inner.gate.lock(), &self.round);
    }
}

impl fmt::Debug for TokenCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCoordinator")
            .field("endpoint", &self.inner.endpoint)
            .field("source", &self.inner.source.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TokenCoordinator`].
#[derive(Default)]
pub struct TokenCoordinatorBuilder {
    endpoint: Option<Endpoint>,
    source: Option<Arc<dyn CredentialSource>>,
    builder: Option<Arc<dyn TokenBuilder>>,
    config: RefreshConfig,
}

impl TokenCoordinatorBuilder {
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn source(mut self, source: impl CredentialSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn shared_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn token_builder(mut self, builder: impl TokenBuilder + 'static) -> Self {
        self.builder = Some(Arc::new(builder));
        self
    }

    pub fn config(mut self, config: RefreshConfig) -> Self {
        self.config = config;
        self
    }

    pub fn refresh_window(mut self, window: Duration) -> Self {
        self.config.refresh_window = window;
        self
    }

    pub fn token_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.token_lifetime = lifetime;
        self
    }

    pub fn tracing(mut self, enabled: bool) -> Self {
        self.config.tracing = enabled;
        self
    }

    pub fn build(self) -> Result<TokenCoordinator> {
        self.config.validate()?;
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::config("endpoint is required"))?;
        let source = self
            .source
            .ok_or_else(|| Error::config("credential source is required"))?;
        let builder = self
            .builder
            .ok_or_else(|| Error::config("token builder is required"))?;

        Ok(TokenCoordinator {
            inner: Arc::new(Inner {
                endpoint,
                source,
                builder,
                spans: RefreshSpans::new(self.config.tracing),
                config: self.config,
                state: SharedCell::default(),
                gate: Mutex::new(None),
                rounds: AtomicU64::new(0),
            }),
        })
    }
}
