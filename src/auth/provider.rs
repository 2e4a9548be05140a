//! Credential source and token builder traits.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use super::{Endpoint, SourceCredential};
use crate::Result;

/// Produces the time-bounded secret a connection token is derived from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Source name for logs and errors.
    fn name(&self) -> &str;

    /// Retrieve the current credential.
    async fn retrieve(&self) -> Result<SourceCredential>;

    /// Whether [`invalidate`](Self::invalidate) discards a memoized value.
    fn supports_invalidation(&self) -> bool {
        false
    }

    /// Best-effort request to drop any memoized credential so the next
    /// [`retrieve`](Self::retrieve) fetches a fresh one.
    fn invalidate(&self) {}
}

/// Builds the authentication token presented to the database.
#[async_trait]
pub trait TokenBuilder: Send + Sync {
    async fn build(&self, endpoint: &Endpoint, credential: &SourceCredential)
    -> Result<SecretString>;
}

#[async_trait]
impl<T: CredentialSource + ?Sized> CredentialSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn retrieve(&self) -> Result<SourceCredential> {
        (**self).retrieve().await
    }

    fn supports_invalidation(&self) -> bool {
        (**self).supports_invalidation()
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}

#[async_trait]
impl<T: TokenBuilder + ?Sized> TokenBuilder for Arc<T> {
    async fn build(
        &self,
        endpoint: &Endpoint,
        credential: &SourceCredential,
    ) -> Result<SecretString> {
        (**self).build(endpoint, credential).await
    }
}
