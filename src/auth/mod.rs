//! Anonymous identity for store access.
//!
//! [`SessionManager`] drives an [`IdentityProvider`] through sign-in with
//! capped retries and exposes the result to the gateway as a
//! [`SessionGate`].

mod anonymous;
mod session;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

pub use anonymous::{AnonymousSignIn, DEFAULT_IDENTITY_BASE_URL};
pub use session::{AuthState, RetryPolicy, SessionManager};

/// Credentials for one signed-in anonymous user.
///
/// `Debug` never prints the tokens; `SecretString` redacts them.
#[derive(Debug)]
pub struct Session {
    pub uid: String,
    pub id_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Sign-in request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Provider answered with an error body, e.g. `OPERATION_NOT_ALLOWED`
    #[error("Identity provider rejected sign-in: {0}")]
    Rejected(String),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Malformed sign-in response: {0}")]
    MalformedResponse(String),
    #[error("Insecure identity base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Invalid identity base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Something that can mint an anonymous session.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<Session, AuthError>;
}

/// Tells the gateway whether store calls may proceed.
pub trait SessionGate: Send + Sync {
    fn is_usable(&self) -> bool;
}
