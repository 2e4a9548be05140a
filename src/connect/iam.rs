//! IAM token connect hook.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{BeforeConnect, PasswordAuth};
use crate::Result;
use crate::auth::TokenCoordinator;
use crate::observability::record_error;

/// Writes a coordinator token into the password field before each dial.
#[derive(Clone, Debug)]
pub struct IamBeforeConnect {
    coordinator: TokenCoordinator,
    cancel: Option<CancellationToken>,
}

impl IamBeforeConnect {
    pub fn new(coordinator: TokenCoordinator) -> Self {
        Self {
            coordinator,
            cancel: None,
        }
    }

    /// Stop waiting on refreshes once `cancel` fires (e.g. on pool shutdown).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn coordinator(&self) -> &TokenCoordinator {
        &self.coordinator
    }
}

#[async_trait]
impl<O> BeforeConnect<O> for IamBeforeConnect
where
    O: PasswordAuth + Send,
{
    async fn before_connect(&self, options: &mut O) -> Result<()> {
        let span = self
            .coordinator
            .spans()
            .before_connect(&self.coordinator.endpoint().host_port());

        let token = match &self.cancel {
            Some(cancel) => {
                self.coordinator
                    .token_with_cancel(cancel)
                    .instrument(span.clone())
                    .await
            }
            None => self.coordinator.token().instrument(span.clone()).await,
        };

        match token {
            Ok(token) => {
                options.set_password(token.expose_secret());
                Ok(())
            }
            Err(e) => {
                record_error(&span, &e);
                tracing::debug!(error = %e, "Aborting connection attempt");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Endpoint, SourceCredential, StaticSource, TokenBuilder};
    use crate::{Error, RefreshConfig};
    use secrecy::SecretString;

    #[derive(Default)]
    struct Options {
        password: Option<String>,
    }

    impl PasswordAuth for Options {
        fn set_password(&mut self, password: &str) {
            self.password = Some(password.to_string());
        }
    }

    struct EchoBuilder;

    #[async_trait]
    impl TokenBuilder for EchoBuilder {
        async fn build(
            &self,
            endpoint: &Endpoint,
            credential: &SourceCredential,
        ) -> Result<SecretString> {
            Ok(SecretString::from(format!(
                "{}:{}",
                endpoint.user, credential.access_key_id
            )))
        }
    }

    struct FailingBuilder;

    #[async_trait]
    impl TokenBuilder for FailingBuilder {
        async fn build(&self, _: &Endpoint, _: &SourceCredential) -> Result<SecretString> {
            Err(Error::token_build("signing failed"))
        }
    }

    fn coordinator(builder: impl TokenBuilder + 'static) -> TokenCoordinator {
        TokenCoordinator::new(
            Endpoint::new("db", 5432, "app", "us-east-1"),
            StaticSource::keys("AKID", "secret"),
            builder,
            RefreshConfig::default().with_tracing(true),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sets_password() {
        let hook = IamBeforeConnect::new(coordinator(EchoBuilder));
        let mut options = Options::default();

        hook.before_connect(&mut options).await.unwrap();
        assert_eq!(options.password.as_deref(), Some("app:AKID"));
    }

    #[tokio::test]
    async fn test_error_aborts_and_leaves_options() {
        let hook = IamBeforeConnect::new(coordinator(FailingBuilder));
        let mut options = Options::default();

        let err = hook.before_connect(&mut options).await.unwrap_err();
        assert!(matches!(err, Error::TokenBuild { .. }));
        assert!(options.password.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_hook_returns_cancelled_on_stale_path() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let hook = IamBeforeConnect::new(coordinator(EchoBuilder)).with_cancellation(cancel);
        let mut options = Options::default();

        let err = hook.before_connect(&mut options).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(options.password.is_none());
    }
}
