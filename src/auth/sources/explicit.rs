//! Explicit credential source.

use async_trait::async_trait;

use crate::Result;
use crate::auth::{CredentialSource, SourceCredential};

/// Source that always returns the same credential.
pub struct StaticSource {
    credential: SourceCredential,
}

impl StaticSource {
    pub fn new(credential: SourceCredential) -> Self {
        Self { credential }
    }

    /// Create from an access key pair without expiry.
    pub fn keys(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self::new(SourceCredential::new(access_key_id, secret_access_key))
    }
}

#[async_trait]
impl CredentialSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn retrieve(&self) -> Result<SourceCredential> {
        Ok(self.credential.clone())
    }
}
