//! Refresh timing configuration.
//!
//! ```rust
//! use std::time::Duration;
//! use iam_token_cache::RefreshConfig;
//!
//! let config = RefreshConfig::default()
//!     .with_refresh_window(Duration::from_secs(60))
//!     .with_tracing(true);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{env_bool_opt, env_parse};
use crate::{Error, Result};

/// Margin before expiration at which a token is treated as stale.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(2 * 60);

/// RDS IAM authentication tokens are valid for 15 minutes.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(15 * 60);

pub const ENV_REFRESH_WINDOW_SECS: &str = "IAM_TOKEN_REFRESH_WINDOW_SECS";
pub const ENV_TOKEN_LIFETIME_SECS: &str = "IAM_TOKEN_LIFETIME_SECS";
pub const ENV_TRACING: &str = "IAM_TOKEN_TRACING";

/// Timing and observability settings for a [`TokenCoordinator`](crate::TokenCoordinator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Subtracted from the expiration to decide when to refresh.
    #[serde(rename = "refresh_window_secs", with = "duration_secs")]
    pub refresh_window: Duration,
    /// Upper bound on how long a freshly built token is used.
    #[serde(rename = "token_lifetime_secs", with = "duration_secs")]
    pub token_lifetime: Duration,
    /// Wrap refresh phases in tracing spans.
    pub tracing: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_window: DEFAULT_REFRESH_WINDOW,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            tracing: false,
        }
    }
}

impl RefreshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `IAM_TOKEN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>(ENV_REFRESH_WINDOW_SECS)? {
            config.refresh_window = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>(ENV_TOKEN_LIFETIME_SECS)? {
            config.token_lifetime = Duration::from_secs(secs);
        }
        if let Some(tracing) = env_bool_opt(ENV_TRACING)? {
            config.tracing = tracing;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.token_lifetime.is_zero() {
            return Err(Error::config("token lifetime must be greater than zero"));
        }
        if self.refresh_window >= self.token_lifetime {
            return Err(Error::config(format!(
                "refresh window ({}s) must be shorter than token lifetime ({}s)",
                self.refresh_window.as_secs(),
                self.token_lifetime.as_secs()
            )));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RefreshConfig::default();
        assert_eq!(config.refresh_window, Duration::from_secs(120));
        assert_eq!(config.token_lifetime, Duration::from_secs(900));
        assert!(!config.tracing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_window_longer_than_lifetime() {
        let config = RefreshConfig::default()
            .with_refresh_window(Duration::from_secs(600))
            .with_token_lifetime(Duration::from_secs(300));
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_lifetime() {
        let config = RefreshConfig::default()
            .with_refresh_window(Duration::ZERO)
            .with_token_lifetime(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_window_is_allowed() {
        let config = RefreshConfig::default().with_refresh_window(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_uses_seconds() {
        let config: RefreshConfig =
            serde_json::from_str(r#"{"refresh_window_secs": 60, "tracing": true}"#).unwrap();
        assert_eq!(config.refresh_window, Duration::from_secs(60));
        assert_eq!(config.token_lifetime, DEFAULT_TOKEN_LIFETIME);
        assert!(config.tracing);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["token_lifetime_secs"], 900);
    }

    #[test]
    fn test_from_env() {
        // SAFETY: Test-only environment setup; only this test touches these keys
        unsafe {
            std::env::set_var(ENV_REFRESH_WINDOW_SECS, "30");
            std::env::set_var(ENV_TOKEN_LIFETIME_SECS, "600");
            std::env::set_var(ENV_TRACING, "true");
        }

        let config = RefreshConfig::from_env().unwrap();
        assert_eq!(config.refresh_window, Duration::from_secs(30));
        assert_eq!(config.token_lifetime, Duration::from_secs(600));
        assert!(config.tracing);

        unsafe { std::env::set_var(ENV_TOKEN_LIFETIME_SECS, "10") };
        assert!(RefreshConfig::from_env().is_err());

        unsafe {
            std::env::remove_var(ENV_REFRESH_WINDOW_SECS);
            std::env::remove_var(ENV_TOKEN_LIFETIME_SECS);
            std::env::remove_var(ENV_TRACING);
        }
    }
}
