//! Chain credential source.

use async_trait::async_trait;

use crate::auth::{CredentialSource, SourceCredential};
use crate::{Error, Result};

/// Source that tries multiple sources in order.
pub struct ChainSource {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl ChainSource {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Add a source to the end of the chain.
    pub fn with<S: CredentialSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

#[async_trait]
impl CredentialSource for ChainSource {
    fn name(&self) -> &str {
        "chain"
    }

    /// Returns the first credential found. When every source fails, the last
    /// source's error is returned unchanged.
    async fn retrieve(&self) -> Result<SourceCredential> {
        let mut last_error = None;

        for source in &self.sources {
            match source.retrieve().await {
                Ok(cred) => {
                    tracing::debug!(source = source.name(), "Credential retrieved");
                    return Ok(cred);
                }
                Err(e) => {
                    tracing::debug!(source = source.name(), error = %e, "Source failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::source_failed(self.name(), "no credential sources configured")))
    }

    fn supports_invalidation(&self) -> bool {
        self.sources.iter().any(|s| s.supports_invalidation())
    }

    fn invalidate(&self) {
        for source in &self.sources {
            source.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CachedSource, EnvironmentSource, StaticSource};

    fn missing_env(tag: &str) -> EnvironmentSource {
        EnvironmentSource::from_vars(
            format!("ITC_CHAIN_{}_AK", tag),
            format!("ITC_CHAIN_{}_SK", tag),
            format!("ITC_CHAIN_{}_ST", tag),
        )
    }

    #[tokio::test]
    async fn test_chain_first_success() {
        let chain = ChainSource::new(vec![])
            .with(StaticSource::keys("first", "s1"))
            .with(StaticSource::keys("second", "s2"));

        let cred = chain.retrieve().await.unwrap();
        assert_eq!(cred.access_key_id, "first");
    }

    #[tokio::test]
    async fn test_chain_fallback() {
        let chain = ChainSource::new(vec![])
            .with(missing_env("FALLBACK"))
            .with(StaticSource::keys("fallback", "s"));

        let cred = chain.retrieve().await.unwrap();
        assert_eq!(cred.access_key_id, "fallback");
    }

    #[tokio::test]
    async fn test_chain_all_fail() {
        let chain = ChainSource::new(vec![])
            .with(missing_env("ALL1"))
            .with(missing_env("ALL2"));

        let err = chain.retrieve().await.unwrap_err();
        match &err {
            Error::Source { source_name, .. } => assert_eq!(source_name, "environment"),
            other => panic!("Expected Source error, got {other:?}"),
        }
        assert!(err.to_string().contains("ITC_CHAIN_ALL2_AK"));
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let err = ChainSource::new(vec![]).retrieve().await.unwrap_err();
        assert!(matches!(err, Error::Source { ref source_name, .. } if source_name == "chain"));
    }

    #[test]
    fn test_chain_invalidation_support() {
        let plain = ChainSource::new(vec![]).with(StaticSource::keys("a", "b"));
        assert!(!plain.supports_invalidation());

        let cached = plain.with(CachedSource::new(StaticSource::keys("c", "d")));
        assert!(cached.supports_invalidation());
    }
}
