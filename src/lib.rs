//! # iam-token-cache
//!
//! Single-flight cache of short-lived IAM database tokens.
//!
//! A connection pool asks for a token right before it dials a new physical
//! connection. The [`TokenCoordinator`] answers from its cached snapshot while
//! the token is fresh, and when it goes stale exactly one caller per staleness
//! event triggers a refresh; every other caller of that round waits for and
//! shares the same outcome.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use iam_token_cache::auth::{Endpoint, EnvironmentSource, TokenCoordinator};
//! use iam_token_cache::RefreshConfig;
//! # use iam_token_cache::auth::{SourceCredential, TokenBuilder};
//! # use secrecy::SecretString;
//! # struct MyBuilder;
//! # #[async_trait::async_trait]
//! # impl TokenBuilder for MyBuilder {
//! #     async fn build(&self, _: &Endpoint, _: &SourceCredential) -> iam_token_cache::Result<SecretString> {
//! #         Ok(SecretString::from("token".to_string()))
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), iam_token_cache::Error> {
//!     let coordinator = TokenCoordinator::builder()
//!         .endpoint(Endpoint::new("db.example.internal", 5432, "app", "us-east-1"))
//!         .source(EnvironmentSource::new())
//!         .token_builder(MyBuilder)
//!         .config(RefreshConfig::from_env()?)
//!         .build()?;
//!
//!     let token = coordinator.token().await?;
//!     # let _ = token;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod auth;
pub mod common;
pub mod config;
pub mod connect;
pub mod observability;

use std::error::Error as StdError;
use std::sync::Arc;

pub use auth::{
    CachedSource, ChainSource, CredentialSource, Endpoint, EnvironmentSource, SourceCredential,
    StaticSource, TokenBuilder, TokenCoordinator, TokenCoordinatorBuilder, TokenSnapshot,
};
#[cfg(feature = "aws")]
pub use auth::{AwsSdkSource, RdsTokenBuilder};
pub use common::SharedCell;
pub use config::RefreshConfig;
pub use connect::{BeforeConnect, IamBeforeConnect, PasswordAuth, SharedBeforeConnect};
#[cfg(feature = "postgres")]
pub use connect::PgConnector;
pub use observability::RefreshSpans;

/// Boxed error accepted from credential sources and token builders.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared, cloneable handle to an underlying error.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Error type for token cache operations.
///
/// Errors are `Clone` because a single refresh outcome is handed to every
/// caller that waited on that round. Underlying errors are kept as-is and are
/// reachable through [`std::error::Error::source`].
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The credential source failed to produce a secret.
    #[error("Credential source '{source_name}' failed: {source}")]
    Source {
        source_name: String,
        #[source]
        source: SharedError,
    },

    /// A secret was obtained but the connection token could not be built.
    #[error("Token build failed: {source}")]
    TokenBuild {
        #[source]
        source: SharedError,
    },

    /// The caller stopped waiting before the refresh round completed.
    #[error("Token request cancelled while waiting for refresh")]
    Cancelled,

    /// The refresh round ended without publishing an outcome.
    #[error("Token refresh round {round} was abandoned before completing")]
    RoundAbandoned { round: u64 },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dialing the connection failed after the token was applied.
    #[error("Connection failed: {source}")]
    Connect {
        #[source]
        source: SharedError,
    },
}

impl Error {
    pub fn source_failed(source_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Source {
            source_name: source_name.into(),
            source: Arc::from(source.into()),
        }
    }

    pub fn token_build(source: impl Into<BoxError>) -> Self {
        Error::TokenBuild {
            source: Arc::from(source.into()),
        }
    }

    pub fn connect(source: impl Into<BoxError>) -> Self {
        Error::Connect {
            source: Arc::from(source.into()),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether the next connection attempt may succeed by starting a new round.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Source { .. }
                | Error::TokenBuild { .. }
                | Error::RoundAbandoned { .. }
                | Error::Connect { .. }
        )
    }
}

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_keeps_underlying_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::source_failed("environment", io);

        assert_eq!(
            err.to_string(),
            "Credential source 'environment' failed: denied"
        );
        let inner = StdError::source(&err).unwrap();
        assert_eq!(inner.to_string(), "denied");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cloned_error_shares_source() {
        let err = Error::token_build("bad region");
        let cloned = err.clone();

        match (&err, &cloned) {
            (Error::TokenBuild { source: a }, Error::TokenBuild { source: b }) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => panic!("Expected TokenBuild errors"),
        }
    }

    #[test]
    fn test_error_predicates() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::config("bad").is_retryable());
        assert!(Error::RoundAbandoned { round: 3 }.is_retryable());
    }
}
