//! Credential sources, token builders and the refresh coordinator.
//!
//! - [`CredentialSource`]: where the time-bounded secret comes from
//! - [`TokenBuilder`]: how that secret becomes a connection token
//! - [`TokenCoordinator`]: caches the token and runs single-flight refreshes

mod coordinator;
mod credential;
mod provider;
#[cfg(feature = "aws")]
mod rds;
mod sources;
pub(crate) mod state;

pub use coordinator::{TokenCoordinator, TokenCoordinatorBuilder, TokenSnapshot};
pub use credential::{Endpoint, SourceCredential};
pub use provider::{CredentialSource, TokenBuilder};
#[cfg(feature = "aws")]
pub use rds::RdsTokenBuilder;
#[cfg(feature = "aws")]
pub use sources::AwsSdkSource;
pub use sources::{CachedSource, ChainSource, EnvironmentSource, StaticSource};
