//! sqlx Postgres integration.
//!
//! Enable with the `postgres` feature flag.
//!
//! sqlx pools dial with the options they were given and have no per-dial
//! callback. [`PgConnector`] runs the hook for single connections, and for a
//! pool it keeps the stored options fresh with a background refresher that
//! re-runs the hook just after each token enters its refresh window.

use std::sync::Arc;
use std::time::Duration;

use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{BeforeConnect, IamBeforeConnect, PasswordAuth};
use crate::auth::{Endpoint, TokenCoordinator};
use crate::{Error, Result};

/// Refresh cadence for hooks whose token expiry is unknown.
const FALLBACK_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Lower bound between two refreshes, including retries after a failure.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Past the window boundary, so the wake-up always finds the token stale.
const STALE_MARGIN: Duration = Duration::from_millis(1);

impl PasswordAuth for PgConnectOptions {
    fn set_password(&mut self, password: &str) {
        *self = self.clone().password(password);
    }
}

impl Endpoint {
    /// Endpoint of the host, port and user in `options`.
    pub fn from_pg_options(options: &PgConnectOptions, region: impl Into<String>) -> Self {
        Endpoint::new(
            options.get_host(),
            options.get_port(),
            options.get_username(),
            region,
        )
    }
}

/// Applies a connect hook to Postgres connect options before dialing.
#[derive(Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    hook: Arc<dyn BeforeConnect<PgConnectOptions>>,
    coordinator: Option<TokenCoordinator>,
    cancel: CancellationToken,
}

impl PgConnector {
    pub fn new(
        options: PgConnectOptions,
        hook: impl BeforeConnect<PgConnectOptions> + 'static,
    ) -> Self {
        Self {
            options,
            hook: Arc::new(hook),
            coordinator: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Hook the connector up to an IAM token coordinator.
    pub fn iam(options: PgConnectOptions, coordinator: TokenCoordinator) -> Self {
        Self::new(options, IamBeforeConnect::new(coordinator.clone())).with_coordinator(coordinator)
    }

    /// Schedule pool refreshes from `coordinator`'s token expiry.
    pub fn with_coordinator(mut self, coordinator: TokenCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Stop the refreshers of pools opened by [`connect_pool`](Self::connect_pool)
    /// once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stop every refresher started by [`connect_pool`](Self::connect_pool).
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn base_options(&self) -> &PgConnectOptions {
        &self.options
    }

    /// Base options with the hook applied.
    pub async fn prepared_options(&self) -> Result<PgConnectOptions> {
        let mut options = self.options.clone();
        self.hook.before_connect(&mut options).await?;
        Ok(options)
    }

    /// Open one physical connection.
    pub async fn connect(&self) -> Result<PgConnection> {
        let options = self.prepared_options().await?;
        PgConnection::connect_with(&options)
            .await
            .map_err(Error::connect)
    }

    /// Open a pool and keep its connect options fresh until the pool closes
    /// or the connector shuts down.
    pub async fn connect_pool(&self, pool_options: PgPoolOptions) -> Result<PgPool> {
        let options = self.prepared_options().await?;
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(Error::connect)?;

        self.spawn_refresher(&pool, self.cancel.child_token());
        Ok(pool)
    }

    /// Push freshly prepared options into `pool` for its next dials.
    pub async fn refresh_pool(&self, pool: &PgPool) -> Result<()> {
        let options = self.prepared_options().await?;
        pool.set_connect_options(options);
        Ok(())
    }

    /// Re-run the hook into `pool` whenever its token goes stale.
    ///
    /// The task ends when `cancel` fires or the pool is closed.
    pub fn spawn_refresher(&self, pool: &PgPool, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.clone().keep_fresh(pool.clone(), cancel))
    }

    async fn keep_fresh(self, pool: PgPool, cancel: CancellationToken) {
        loop {
            let wake = self.next_refresh();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = pool.close_event() => break,
                _ = tokio::time::sleep_until(wake) => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.refresh_pool(&pool) => match result {
                    Ok(()) => tracing::debug!("Pool connect options refreshed"),
                    Err(e) => tracing::warn!(error = %e, "Pool connect options refresh failed"),
                },
            }
        }
        tracing::debug!("Pool refresher stopped");
    }

    fn next_refresh(&self) -> Instant {
        let now = Instant::now();
        let due = match &self.coordinator {
            Some(coordinator) => match coordinator.snapshot().expires_at {
                Some(expires_at) => {
                    expires_at
                        .checked_sub(coordinator.config().refresh_window)
                        .unwrap_or(now)
                        + STALE_MARGIN
                }
                None => now,
            },
            None => now + FALLBACK_REFRESH_INTERVAL,
        };
        due.max(now + MIN_REFRESH_INTERVAL)
    }
}
