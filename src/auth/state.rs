//! Token state snapshots and refresh rounds.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::Error;

/// A built token and the instant after which it must not be used.
///
/// Kept as one value so token and expiration are always replaced together.
#[derive(Clone)]
pub(crate) struct IssuedToken {
    pub token: SecretString,
    pub expires_at: Instant,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Immutable snapshot of the coordinator's cached token.
#[derive(Clone, Debug, Default)]
pub(crate) struct TokenState {
    pub issued: Option<IssuedToken>,
    pub last_error: Option<Error>,
    pub completed_rounds: u64,
}

impl TokenState {
    /// Stale once `now + window` passes the expiration; empty state is stale.
    pub fn needs_refresh(&self, now: Instant, window: Duration) -> bool {
        match &self.issued {
            Some(issued) => now + window > issued.expires_at,
            None => true,
        }
    }

    /// The cached token if it is still outside the refresh window.
    pub fn fresh_token(&self, now: Instant, window: Duration) -> Option<SecretString> {
        if self.needs_refresh(now, window) {
            return None;
        }
        self.issued.as_ref().map(|issued| issued.token.clone())
    }

    pub fn succeeded(&self, issued: IssuedToken) -> Self {
        Self {
            issued: Some(issued),
            last_error: None,
            completed_rounds: self.completed_rounds + 1,
        }
    }

    /// Keeps the previous token and expiration untouched.
    pub fn failed(&self, error: Error) -> Self {
        Self {
            issued: self.issued.clone(),
            last_error: Some(error),
            completed_rounds: self.completed_rounds + 1,
        }
    }
}

/// Outcome broadcast to every participant of a round.
pub(crate) type RoundOutcome = std::result::Result<SecretString, Error>;

/// One refresh round: the single-use election gate for a staleness event.
///
/// The coordinator's gate slot and the fetch task hold the `Round`; waiters
/// hold only a receiver. Once both owners drop it the sender closes, so a
/// round that dies without publishing wakes its waiters instead of hanging
/// them.
pub(crate) struct Round {
    id: u64,
    outcome: watch::Sender<Option<RoundOutcome>>,
}

impl Round {
    pub fn new(id: u64) -> Self {
        let (outcome, _) = watch::channel(None);
        Self { id, outcome }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn join(&self) -> RoundWaiter {
        RoundWaiter {
            round: self.id,
            rx: self.outcome.subscribe(),
        }
    }

    pub fn publish(&self, outcome: RoundOutcome) {
        self.outcome.send_replace(Some(outcome));
    }
}

impl fmt::Debug for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Round").field("id", &self.id).finish()
    }
}

/// A participant's handle on the round it joined.
pub(crate) struct RoundWaiter {
    round: u64,
    rx: watch::Receiver<Option<RoundOutcome>>,
}

impl RoundWaiter {
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Wait for the round's outcome.
    pub async fn outcome(mut self) -> RoundOutcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or(Err(Error::RoundAbandoned { round: self.round })),
            Err(_) => Err(Error::RoundAbandoned { round: self.round }),
        }
    }
}
