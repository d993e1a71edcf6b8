//! In-memory identity issuer.
//!
//! Implements the full [`Issuer`] contract against process-local state and
//! mints real RS256 tokens, so the verifier and the HTTP gate can be
//! exercised end to end without the external service. Federated credentials
//! are stubbed: the Google `id_token` / Apple `identity_token` is taken to be
//! the asserted email address.

use chrono::Utc;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::{watch, RwLock};
use tracing::debug;
use ulid::Ulid;

use crate::token::{self, IdentityClaims, Jwks, RevocationCheck};

use super::{
    AuthError, Identity, Issuer, SignInRequest, PROVIDER_APPLE, PROVIDER_GOOGLE, PROVIDER_PASSWORD,
};

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const MIN_PASSWORD_LEN: usize = 6;

struct AccountRecord {
    identity: Identity,
    password_hash: Option<Vec<u8>>,
    disabled: bool,
}

#[derive(Default)]
struct IssuerState {
    /// Accounts keyed by normalized email.
    accounts: HashMap<String, AccountRecord>,
    /// Per-uid revocation cut-off (unix seconds).
    tokens_valid_after: HashMap<String, i64>,
}

pub struct MemoryIssuer {
    state: RwLock<IssuerState>,
    current: watch::Sender<Option<Identity>>,
    signing_key: SecretString,
    kid: String,
    issuer: String,
    audience: String,
    token_ttl_seconds: i64,
}

impl MemoryIssuer {
    #[must_use]
    pub fn new(
        signing_key: SecretString,
        kid: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            state: RwLock::new(IssuerState::default()),
            current,
            signing_key,
            kid: kid.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    /// Public half of the signing key, for wiring a matching verifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key cannot be parsed.
    pub fn jwks(&self) -> Result<Jwks, token::Error> {
        Jwks::from_rsa_private_key_pem(self.signing_key.expose_secret(), self.kid.clone())
    }

    /// Revoke all tokens minted for `uid` before now.
    ///
    /// Signed-in clients are not force-disconnected; they discover the
    /// revocation through verification, the same channel as expiry.
    pub async fn revoke_tokens(&self, uid: &str) {
        let mut state = self.state.write().await;
        state
            .tokens_valid_after
            .insert(uid.to_string(), Utc::now().timestamp());
    }

    /// Disable or re-enable an account.
    pub async fn set_disabled(&self, email: &str, disabled: bool) {
        let mut state = self.state.write().await;
        if let Some(account) = state.accounts.get_mut(&normalize_email(email)) {
            account.disabled = disabled;
        }
    }

    fn publish(&self, identity: Option<Identity>) {
        // send_replace never fails even with zero receivers.
        self.current.send_replace(identity);
    }

    async fn federated_sign_in(
        &self,
        asserted_email: &str,
        provider: &'static str,
    ) -> Result<Identity, AuthError> {
        let email = normalize_email(asserted_email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidCredential);
        }

        let mut state = self.state.write().await;
        let identity = match state.accounts.get_mut(&email) {
            Some(account) => {
                if account.disabled {
                    return Err(AuthError::UserDisabled);
                }
                account.identity.provider_ids.insert(provider.to_string());
                account.identity.email_verified = true;
                account.identity.last_sign_in_time = Utc::now();
                account.identity.clone()
            }
            None => {
                // First federated sign-in creates the account.
                let identity = new_identity(&email, provider, true);
                state.accounts.insert(
                    email.clone(),
                    AccountRecord {
                        identity: identity.clone(),
                        password_hash: None,
                        disabled: false,
                    },
                );
                identity
            }
        };
        drop(state);

        self.publish(Some(identity.clone()));
        Ok(identity)
    }
}

#[async_trait::async_trait]
impl Issuer for MemoryIssuer {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let mut state = self.state.write().await;
        if state.accounts.contains_key(&email) {
            return Err(AuthError::EmailAlreadyInUse);
        }
        let identity = new_identity(&email, PROVIDER_PASSWORD, false);
        state.accounts.insert(
            email,
            AccountRecord {
                identity: identity.clone(),
                password_hash: Some(hash_password(password)),
                disabled: false,
            },
        );
        drop(state);

        self.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, request: SignInRequest) -> Result<Identity, AuthError> {
        match request {
            SignInRequest::Password { email, password } => {
                let email = normalize_email(&email);
                let mut state = self.state.write().await;
                let account = state
                    .accounts
                    .get_mut(&email)
                    .ok_or(AuthError::UserNotFound)?;
                if account.disabled {
                    return Err(AuthError::UserDisabled);
                }
                match &account.password_hash {
                    Some(hash) if *hash == hash_password(&password) => {}
                    Some(_) => return Err(AuthError::WrongPassword),
                    // Federated-only account; no password credential exists.
                    None => return Err(AuthError::InvalidCredential),
                }
                account.identity.last_sign_in_time = Utc::now();
                let identity = account.identity.clone();
                drop(state);

                self.publish(Some(identity.clone()));
                Ok(identity)
            }
            SignInRequest::Google { id_token } => {
                self.federated_sign_in(&id_token, PROVIDER_GOOGLE).await
            }
            SignInRequest::Apple {
                identity_token,
                nonce: _,
            } => self.federated_sign_in(&identity_token, PROVIDER_APPLE).await,
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.publish(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        let state = self.state.read().await;
        if !state.accounts.contains_key(&email) {
            return Err(AuthError::UserNotFound);
        }
        // No outbound mail here; the external issuer owns delivery.
        debug!("password reset requested for {email}");
        Ok(())
    }

    async fn id_token(&self, _force_refresh: bool) -> Result<Option<String>, AuthError> {
        let Some(identity) = self.current_identity() else {
            return Ok(None);
        };
        let now = Utc::now().timestamp();
        let claims = IdentityClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: identity.uid.clone(),
            iat: now,
            exp: now + self.token_ttl_seconds,
            auth_time: Some(identity.last_sign_in_time.timestamp()),
            email: identity.email.clone(),
            email_verified: Some(identity.email_verified),
            name: identity.display_name.clone(),
            picture: identity.photo_url.clone(),
        };
        let token = token::sign_rs256(self.signing_key.expose_secret(), self.kid.clone(), &claims)
            .map_err(|err| AuthError::Issuer(err.to_string()))?;
        Ok(Some(token))
    }

    fn state_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    fn current_identity(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }
}

#[async_trait::async_trait]
impl RevocationCheck for MemoryIssuer {
    async fn tokens_valid_after(&self, uid: &str) -> Option<i64> {
        let state = self.state.read().await;
        state.tokens_valid_after.get(uid).copied()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

fn hash_password(password: &str) -> Vec<u8> {
    // Test/dev issuer only; the external issuer owns real credential storage.
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

fn new_identity(email: &str, provider: &str, email_verified: bool) -> Identity {
    let now = Utc::now();
    let mut provider_ids = BTreeSet::new();
    provider_ids.insert(provider.to_string());
    Identity {
        uid: Ulid::new().to_string(),
        email: Some(email.to_string()),
        email_verified,
        display_name: None,
        photo_url: None,
        provider_ids,
        creation_time: now,
        last_sign_in_time: now,
    }
}
