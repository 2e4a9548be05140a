//! Environment variable credential source.

use async_trait::async_trait;

use crate::auth::{CredentialSource, SourceCredential};
use crate::common::env_opt;
use crate::{Error, Result};

const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

/// Source that reads an access key pair from environment variables.
///
/// Variables are read on every retrieval so rotated values are picked up.
pub struct EnvironmentSource {
    access_key_var: String,
    secret_key_var: String,
    session_token_var: String,
}

impl EnvironmentSource {
    /// Use the standard `AWS_*` variables.
    pub fn new() -> Self {
        Self::from_vars(ACCESS_KEY_VAR, SECRET_KEY_VAR, SESSION_TOKEN_VAR)
    }

    pub fn from_vars(
        access_key_var: impl Into<String>,
        secret_key_var: impl Into<String>,
        session_token_var: impl Into<String>,
    ) -> Self {
        Self {
            access_key_var: access_key_var.into(),
            secret_key_var: secret_key_var.into(),
            session_token_var: session_token_var.into(),
        }
    }

    fn required(&self, var: &str) -> Result<String> {
        env_opt(var).ok_or_else(|| Error::source_failed(self.name(), format!("{} not set", var)))
    }
}

impl Default for EnvironmentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for EnvironmentSource {
    fn name(&self) -> &str {
        "environment"
    }

    async fn retrieve(&self) -> Result<SourceCredential> {
        let access_key = self.required(&self.access_key_var)?;
        let secret_key = self.required(&self.secret_key_var)?;

        let mut credential = SourceCredential::new(access_key, secret_key);
        if let Some(token) = env_opt(&self.session_token_var) {
            credential = credential.with_session_token(token);
        }
        Ok(credential)
    }
}
