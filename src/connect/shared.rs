//! Runtime-swappable connect hook.

use std::sync::Arc;

use async_trait::async_trait;

use super::BeforeConnect;
use crate::Result;
use crate::common::SharedCell;

/// A connect hook every holder shares; [`replace`](Self::replace) redirects
/// all future dials at once.
///
/// Connections that are already open are not touched. Only the next physical
/// connection, from any pool holding a clone, picks up the new hook.
pub struct SharedBeforeConnect<O> {
    hook: SharedCell<Arc<dyn BeforeConnect<O>>>,
}

impl<O: Send + 'static> SharedBeforeConnect<O> {
    pub fn new(hook: impl BeforeConnect<O> + 'static) -> Self {
        Self {
            hook: SharedCell::new(Arc::new(hook)),
        }
    }

    /// Swap the hook for every holder.
    pub fn replace(&self, hook: impl BeforeConnect<O> + 'static) {
        self.hook.swap(Arc::new(hook));
        tracing::debug!("Connect hook replaced");
    }

    pub fn current(&self) -> Arc<dyn BeforeConnect<O>> {
        self.hook.load().as_ref().clone()
    }
}

impl<O> Clone for SharedBeforeConnect<O> {
    fn clone(&self) -> Self {
        Self {
            hook: self.hook.clone(),
        }
    }
}

#[async_trait]
impl<O: Send + 'static> BeforeConnect<O> for SharedBeforeConnect<O> {
    async fn before_connect(&self, options: &mut O) -> Result<()> {
        let hook = self.current();
        hook.before_connect(options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct Options {
        user: String,
        port: u16,
    }

    struct Target {
        user: &'static str,
        port: u16,
    }

    #[async_trait]
    impl BeforeConnect<Options> for Target {
        async fn before_connect(&self, options: &mut Options) -> Result<()> {
            options.user = self.user.to_string();
            options.port = self.port;
            Ok(())
        }
    }

    struct Unknown;

    #[async_trait]
    impl BeforeConnect<Options> for Unknown {
        async fn before_connect(&self, _: &mut Options) -> Result<()> {
            Err(Error::config("unknown database"))
        }
    }

    #[tokio::test]
    async fn test_replace_redirects_every_holder() {
        let hook = SharedBeforeConnect::new(Target {
            user: "user1",
            port: 5432,
        });
        let pool_a = hook.clone();
        let pool_b = hook.clone();

        let mut options = Options::default();
        pool_a.before_connect(&mut options).await.unwrap();
        assert_eq!((options.user.as_str(), options.port), ("user1", 5432));

        hook.replace(Target {
            user: "user2",
            port: 5433,
        });

        for pool in [&pool_a, &pool_b] {
            let mut options = Options::default();
            pool.before_connect(&mut options).await.unwrap();
            assert_eq!((options.user.as_str(), options.port), ("user2", 5433));
        }
    }

    #[tokio::test]
    async fn test_replaced_hook_errors_propagate() {
        let hook = SharedBeforeConnect::new(Target {
            user: "user1",
            port: 5432,
        });
        hook.replace(Unknown);

        let mut options = Options::default();
        let err = hook.before_connect(&mut options).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
