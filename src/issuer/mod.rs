//! External identity-issuer contract.
//!
//! The issuer owns accounts, passwords, and token minting; this crate only
//! depends on its operations: exchange credentials for an [`Identity`], mint
//! identity tokens, sign out, and broadcast identity-state changes. The
//! in-memory implementation ([`MemoryIssuer`]) exists for tests and local
//! development.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::sync::watch;

mod memory;

pub use memory::MemoryIssuer;

pub const PROVIDER_PASSWORD: &str = "password";
pub const PROVIDER_GOOGLE: &str = "google.com";
pub const PROVIDER_APPLE: &str = "apple.com";

/// An authenticated principal as reported by the issuer.
///
/// `uid` is immutable and globally unique for the lifetime of the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub provider_ids: BTreeSet<String>,
    pub creation_time: DateTime<Utc>,
    pub last_sign_in_time: DateTime<Utc>,
}

/// Provider-specific credential exchange request.
///
/// One sum type instead of duck-typed branches at every call site; all three
/// variants resolve through [`Issuer::sign_in`].
#[derive(Debug, Clone)]
pub enum SignInRequest {
    Password { email: String, password: String },
    Google { id_token: String },
    Apple { identity_token: String, nonce: String },
}

/// Credential-exchange failures, mirroring the issuer's error codes.
///
/// Every variant maps to a fixed human-readable message via
/// [`AuthError::user_message`]; user-initiated auth actions resolve to either
/// success or exactly one of these messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("email already in use")]
    EmailAlreadyInUse,
    #[error("invalid email")]
    InvalidEmail,
    #[error("operation not allowed")]
    OperationNotAllowed,
    #[error("weak password")]
    WeakPassword,
    #[error("user disabled")]
    UserDisabled,
    #[error("user not found")]
    UserNotFound,
    #[error("wrong password")]
    WrongPassword,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("too many requests")]
    TooManyRequests,
    #[error("network request failed")]
    NetworkFailure,
    #[error("issuer error: {0}")]
    Issuer(String),
}

impl AuthError {
    /// Fixed code→message mapping surfaced to end users.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmailAlreadyInUse => "This email is already registered. Please sign in instead.",
            Self::InvalidEmail => "Please enter a valid email address.",
            Self::OperationNotAllowed => {
                "This sign-in method is not enabled. Please contact support."
            }
            Self::WeakPassword => "Password is too weak. Please use at least 6 characters.",
            Self::UserDisabled => "This account has been disabled. Please contact support.",
            Self::UserNotFound => "No account found with this email. Please sign up first.",
            Self::WrongPassword => "Incorrect password. Please try again.",
            Self::InvalidCredential => "Invalid email or password. Please check your credentials.",
            Self::TooManyRequests => "Too many failed attempts. Please try again later.",
            Self::NetworkFailure => "Network error. Please check your connection and try again.",
            Self::Issuer(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Identity issuer contract.
///
/// `state_changes` returns a receiver that always carries a current value, so
/// subscribers observe exactly one initial notification (possibly "no
/// identity") followed by every subsequent transition in order.
#[async_trait::async_trait]
pub trait Issuer: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn sign_in(&self, request: SignInRequest) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Mint an identity token for the currently signed-in identity, or `None`
    /// when signed out. `force_refresh` bypasses any cached token.
    async fn id_token(&self, force_refresh: bool) -> Result<Option<String>, AuthError>;

    fn state_changes(&self) -> watch::Receiver<Option<Identity>>;

    fn current_identity(&self) -> Option<Identity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_a_user_message() {
        let errors = [
            AuthError::EmailAlreadyInUse,
            AuthError::InvalidEmail,
            AuthError::OperationNotAllowed,
            AuthError::WeakPassword,
            AuthError::UserDisabled,
            AuthError::UserNotFound,
            AuthError::WrongPassword,
            AuthError::InvalidCredential,
            AuthError::TooManyRequests,
            AuthError::NetworkFailure,
            AuthError::Issuer("boom".to_string()),
        ];
        for error in errors {
            assert!(
                error.user_message().ends_with('.'),
                "message for {error:?} should be a full sentence"
            );
        }
    }

    #[test]
    fn wrong_password_and_invalid_credential_stay_distinct() {
        assert_ne!(
            AuthError::WrongPassword.user_message(),
            AuthError::InvalidCredential.user_message()
        );
    }
}
