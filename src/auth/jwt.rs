use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::TokenVerifier;
use crate::config::AuthSettings;
use crate::utils::error::AuthError;

/// Claims carried by operator tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// HS256 verifier with issuer and role checks.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    roles: Vec<String>,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("key", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

impl JwtVerifier {
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        if !settings.valid_issuers.is_empty() {
            validation.set_issuer(&settings.valid_issuers);
        }
        Self {
            key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            roles: settings.roles.clone(),
        }
    }

    /// Decodes and validates `token`.
    pub fn claims(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(AuthError::Token)?;
        Ok(data.claims)
    }

    /// True when one of the token's roles is permitted, ignoring case.
    pub fn is_authorized(&self, claims: &Claims) -> bool {
        claims.roles.iter().any(|role| {
            self.roles
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(role))
        })
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<bool, AuthError> {
        let claims = self.claims(token)?;
        Ok(self.is_authorized(&claims))
    }
}

/// Issue a token for `sub` valid for `valid_for`.
pub fn issue_token(
    secret: &[u8],
    sub: &str,
    roles: &[String],
    issuer: Option<&str>,
    valid_for: Duration,
) -> Result<String, AuthError> {
    let exp = (Utc::now() + valid_for).timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        exp: usize::try_from(exp).map_err(|_| AuthError::Expiry(exp))?,
        iss: issuer.map(str::to_string),
        roles: roles.to_vec(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(AuthError::Signing)
}
