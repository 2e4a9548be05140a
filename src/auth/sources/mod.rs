//! Credential source implementations.

#[cfg(feature = "aws")]
mod aws;
mod cache;
mod chain;
mod environment;
mod explicit;

#[cfg(feature = "aws")]
pub use aws::AwsSdkSource;
pub use cache::CachedSource;
pub use chain::ChainSource;
pub use environment::EnvironmentSource;
pub use explicit::StaticSource;
