//! Credential caching layer.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Result;
use crate::auth::{CredentialSource, SourceCredential};

const DEFAULT_TTL: Duration = Duration::from_secs(300); // 5 minutes

struct CacheEntry {
    credential: SourceCredential,
    fetched_at: Instant,
}

/// A memoizing wrapper around any [`CredentialSource`] that can be invalidated.
///
/// An entry is reused until its TTL elapses or the credential itself has
/// expired. [`CredentialSource::invalidate`] drops the entry so the next
/// retrieval goes to the inner source.
pub struct CachedSource<S> {
    inner: S,
    cache: Mutex<Option<CacheEntry>>,
    ttl: Duration,
}

impl<S: CredentialSource> CachedSource<S> {
    pub fn new(source: S) -> Self {
        Self {
            inner: source,
            cache: Mutex::new(None),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn cached(&self) -> Option<SourceCredential> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() <= self.ttl)
            .filter(|entry| entry.credential.remaining() != Some(Duration::ZERO))
            .map(|entry| entry.credential.clone())
    }
}

#[async_trait]
impl<S: CredentialSource> CredentialSource for CachedSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn retrieve(&self) -> Result<SourceCredential> {
        if let Some(credential) = self.cached() {
            return Ok(credential);
        }

        let credential = self.inner.retrieve().await?;

        *self.cache.lock() = Some(CacheEntry {
            credential: credential.clone(),
            fetched_at: Instant::now(),
        });

        Ok(credential)
    }

    fn supports_invalidation(&self) -> bool {
        true
    }

    fn invalidate(&self) {
        tracing::debug!(source = self.inner.name(), "Invalidating cached credential");
        *self.cache.lock() = None;
        self.inner.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        ttl: Option<Duration>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                ttl: None,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn retrieve(&self) -> Result<SourceCredential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let cred = SourceCredential::new(format!("AKID{}", n), "secret");
            Ok(match self.ttl {
                Some(ttl) => cred.expires_in(ttl),
                None => cred,
            })
        }
    }

    #[tokio::test]
    async fn test_caching() {
        let cached = CachedSource::new(CountingSource::new());

        let first = cached.retrieve().await.unwrap();
        assert_eq!(1, cached.inner().call_count());

        let second = cached.retrieve().await.unwrap();
        assert_eq!(1, cached.inner().call_count());
        assert_eq!(first.access_key_id, second.access_key_id);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cached = CachedSource::new(CountingSource::new());
        assert!(cached.supports_invalidation());

        let _ = cached.retrieve().await.unwrap();
        cached.invalidate();
        let cred = cached.retrieve().await.unwrap();

        assert_eq!(2, cached.inner().call_count());
        assert_eq!(cred.access_key_id, "AKID1");
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cached = CachedSource::new(CountingSource::new()).with_ttl(Duration::from_millis(10));

        let _ = cached.retrieve().await.unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let _ = cached.retrieve().await.unwrap();

        assert_eq!(2, cached.inner().call_count());
    }

    #[tokio::test]
    async fn test_expired_credential_is_not_reused() {
        let mut inner = CountingSource::new();
        inner.ttl = Some(Duration::ZERO);
        let cached = CachedSource::new(inner);

        let _ = cached.retrieve().await.unwrap();
        let _ = cached.retrieve().await.unwrap();

        assert_eq!(2, cached.inner().call_count());
    }
}
