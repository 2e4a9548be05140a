//! RDS IAM authentication token builder.
//!
//! A token is a SigV4-presigned `connect` request for the `rds-db` service,
//! with the signature carried in the query string and the scheme stripped.
//! See <https://docs.aws.amazon.com/AmazonRDS/latest/UserGuide/UsingWithRDS.IAMDBAuth.Connecting.html>

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_sigv4::http_request::{
    SignableBody, SignableRequest, SignatureLocation, SigningSettings, sign,
};
use aws_sigv4::sign::v4::SigningParams;
use aws_smithy_runtime_api::client::identity::Identity;
use secrecy::SecretString;

use super::{Endpoint, SourceCredential, TokenBuilder};
use crate::{Error, Result};

const SERVICE_NAME: &str = "rds-db";
const TOKEN_EXPIRES_IN: Duration = Duration::from_secs(900);

/// Builds RDS IAM tokens locally; no network call is made.
#[derive(Clone, Debug, Default)]
pub struct RdsTokenBuilder {
    expires_in: Option<Duration>,
}

impl RdsTokenBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the presigned URL validity (RDS accepts at most 15 minutes).
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    fn sign_at(
        &self,
        endpoint: &Endpoint,
        credential: &SourceCredential,
        time: SystemTime,
    ) -> Result<String> {
        let aws_creds = aws_credential_types::Credentials::new(
            &credential.access_key_id,
            credential.secret_access_key(),
            credential.session_token().map(str::to_string),
            credential.expires_at(),
            "iam-token-cache",
        );
        let identity = Identity::new(aws_creds, credential.expires_at());

        let mut settings = SigningSettings::default();
        settings.expires_in = Some(self.expires_in.unwrap_or(TOKEN_EXPIRES_IN));
        settings.signature_location = SignatureLocation::QueryParams;

        let signing_params = SigningParams::builder()
            .identity(&identity)
            .region(&endpoint.region)
            .name(SERVICE_NAME)
            .time(time)
            .settings(settings)
            .build()
            .map_err(Error::token_build)?;

        let mut url = url::Url::parse_with_params(
            &format!("https://{}/", endpoint.host_port()),
            &[("Action", "connect"), ("DBUser", endpoint.user.as_str())],
        )
        .map_err(Error::token_build)?;

        let signable_request = SignableRequest::new(
            "GET",
            url.as_str(),
            std::iter::empty::<(&str, &str)>(),
            SignableBody::Bytes(&[]),
        )
        .map_err(Error::token_build)?;

        let (signing_instructions, _) = sign(signable_request, &signing_params.into())
            .map_err(Error::token_build)?
            .into_parts();

        for (name, value) in signing_instructions.params() {
            url.query_pairs_mut().append_pair(name, value);
        }

        let token = url.as_str();
        Ok(token
            .strip_prefix("https://")
            .unwrap_or(token)
            .to_string())
    }
}

#[async_trait]
impl TokenBuilder for RdsTokenBuilder {
    async fn build(
        &self,
        endpoint: &Endpoint,
        credential: &SourceCredential,
    ) -> Result<SecretString> {
        let token = self.sign_at(endpoint, credential, SystemTime::now())?;
        Ok(SecretString::from(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn endpoint() -> Endpoint {
        Endpoint::new("mydb.123456789012.us-east-1.rds.amazonaws.com", 5432, "app_user", "us-east-1")
    }

    #[tokio::test]
    async fn test_token_shape() {
        let cred = SourceCredential::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
        let token = RdsTokenBuilder::new().build(&endpoint(), &cred).await.unwrap();
        let token = token.expose_secret();

        assert!(token.starts_with("mydb.123456789012.us-east-1.rds.amazonaws.com:5432/?"));
        assert!(!token.starts_with("https://"));
        assert!(token.contains("Action=connect"));
        assert!(token.contains("DBUser=app_user"));
        assert!(token.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(token.contains("X-Amz-Expires=900"));
        assert!(token.contains("X-Amz-Signature="));
        assert!(token.contains("%2Fus-east-1%2Frds-db%2Faws4_request"));
    }

    #[test]
    fn test_session_token_is_signed_in() {
        let cred = SourceCredential::new("AKIDEXAMPLE", "secret").with_session_token("sess-token");
        let token = RdsTokenBuilder::new()
            .with_expires_in(Duration::from_secs(300))
            .sign_at(&endpoint(), &cred, SystemTime::now())
            .unwrap();

        assert!(token.contains("X-Amz-Security-Token=sess-token"));
        assert!(token.contains("X-Amz-Expires=300"));
    }

    #[test]
    fn test_signing_is_deterministic_for_fixed_time() {
        let cred = SourceCredential::new("AKIDEXAMPLE", "secret");
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let builder = RdsTokenBuilder::new();

        let a = builder.sign_at(&endpoint(), &cred, at).unwrap();
        let b = builder.sign_at(&endpoint(), &cred, at).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("X-Amz-Date=20231114T221320Z"));
    }
}
