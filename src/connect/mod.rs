//! Connection-setup hooks.
//!
//! A pool calls a [`BeforeConnect`] hook right before dialing each new
//! physical connection. [`IamBeforeConnect`] asks the coordinator for a token
//! on every call and writes it into the connect options; it never caches the
//! token itself.

mod iam;
#[cfg(feature = "postgres")]
mod postgres;
mod shared;

use async_trait::async_trait;

use crate::Result;

pub use iam::IamBeforeConnect;
#[cfg(feature = "postgres")]
pub use postgres::PgConnector;
pub use shared::SharedBeforeConnect;

/// Connect options that carry a password field.
pub trait PasswordAuth {
    fn set_password(&mut self, password: &str);
}

/// Hook invoked with the connect options before each dial.
///
/// Returning an error aborts that connection attempt.
#[async_trait]
pub trait BeforeConnect<O>: Send + Sync {
    async fn before_connect(&self, options: &mut O) -> Result<()>;
}
