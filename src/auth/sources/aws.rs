//! AWS SDK credential source.

use std::fmt;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};

use crate::auth::{CachedSource, CredentialSource, SourceCredential};
use crate::{Error, Result};

/// Source backed by an AWS SDK credentials provider.
///
/// The SDK providers keep their own internal cache that cannot be cleared
/// from outside; wrap this source with [`AwsSdkSource::cached`] to get a
/// memo the coordinator can invalidate.
pub struct AwsSdkSource {
    provider: SharedCredentialsProvider,
}

impl fmt::Debug for AwsSdkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSdkSource").finish_non_exhaustive()
    }
}

impl AwsSdkSource {
    pub fn new(provider: impl ProvideCredentials + 'static) -> Self {
        Self {
            provider: SharedCredentialsProvider::new(provider),
        }
    }

    /// Use the default AWS credential chain (environment, profile, IMDS, ...).
    pub async fn from_env() -> Result<Self> {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let provider = config
            .credentials_provider()
            .ok_or_else(|| Error::config("No AWS credentials provider configured"))?;
        Ok(Self { provider })
    }

    /// Wrap in an invalidatable memo.
    pub fn cached(self) -> CachedSource<Self> {
        CachedSource::new(self)
    }
}

#[async_trait]
impl CredentialSource for AwsSdkSource {
    fn name(&self) -> &str {
        "aws-sdk"
    }

    async fn retrieve(&self) -> Result<SourceCredential> {
        let creds = self
            .provider
            .provide_credentials()
            .await
            .map_err(|e| Error::source_failed(self.name(), e))?;

        let mut credential =
            SourceCredential::new(creds.access_key_id(), creds.secret_access_key());
        if let Some(token) = creds.session_token() {
            credential = credential.with_session_token(token);
        }
        if let Some(expiry) = creds.expiry() {
            credential = credential.with_expiry(expiry);
        }
        Ok(credential)
    }
}
