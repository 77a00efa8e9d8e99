//! The `auth` module is the Token Authorizer consulted before any data is sent.
//!
//! The relay depends only on `TokenVerifier`; `JwtVerifier` is the production
//! implementation, also used by the HTTP surface to check bearer tokens.

pub mod jwt;

use async_trait::async_trait;

use crate::utils::error::AuthError;

pub use jwt::{Claims, JwtVerifier, issue_token};

/// Asynchronous credential check. `Ok(false)` means the token is genuine but
/// does not grant access.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<bool, AuthError>;
}
