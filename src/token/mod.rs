//! Identity-token signing and verification (RS256 JWT).
//!
//! Verification is stateless: given the issuer's JWKS plus the expected
//! issuer/audience pair, any request can be checked without a database
//! round-trip. Revocation is the one exception and is consulted explicitly
//! through [`RevocationCheck`] only where a handler opts in.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use rsa::errors::Error as RsaError;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

mod jwks;

pub use jwks::{Jwk, Jwks};

/// Decoded, verified claims of an identity token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityClaims {
    pub iss: String,
    pub aud: String,
    /// Stable account id (`uid`) of the authenticated principal.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// When the underlying sign-in happened; used for revocation checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl IdentityClaims {
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.sub
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

impl TokenHeader {
    fn rs256(kid: impl Into<String>) -> Self {
        Self {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
            kid: kid.into(),
        }
    }
}

/// Low-level token decoding/validation failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("rsa error")]
    Rsa(#[from] RsaError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("missing subject")]
    MissingSubject,
}

/// Verification outcome for an `Authorization` header, classified the way the
/// HTTP gate reports it. Every variant maps to 401; the split exists for
/// diagnostics and tests, never for a different status code.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing authentication token")]
    MissingToken,
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("authentication token expired")]
    ExpiredToken,
    #[error("authentication token revoked")]
    RevokedToken,
    #[error("invalid authentication token")]
    InvalidToken(#[source] Error),
}

/// Revocation oracle backed by the issuer.
///
/// `tokens_valid_after` returns the unix timestamp before which previously
/// minted tokens for `uid` are no longer acceptable, or `None` when nothing
/// was revoked.
#[async_trait::async_trait]
pub trait RevocationCheck: Send + Sync {
    async fn tokens_valid_after(&self, uid: &str) -> Option<i64>;
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Mint an RS256-signed identity token.
///
/// Only the in-memory issuer and the test suite sign tokens; production
/// deployments receive tokens from the external issuer.
///
/// # Errors
///
/// Returns an error if the private key cannot be parsed or the header/claims
/// cannot be encoded.
pub fn sign_rs256(
    private_key_pem: &str,
    kid: impl Into<String>,
    claims: &IdentityClaims,
) -> Result<String, Error> {
    let header_b64 = b64e_json(&TokenHeader::rs256(kid))?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let private_key = jwks::decode_private_key(private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(private_key);
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify an RS256 identity token against a key set and return its claims.
///
/// # Errors
///
/// Returns an error if the token is malformed, the `kid` is unknown, the
/// signature does not check out, or the `iss`/`aud`/`exp`/`sub` claims fail
/// validation.
pub fn verify_rs256(
    token: &str,
    jwks: &Jwks,
    expected_issuer: &str,
    expected_audience: &str,
    now_unix_seconds: i64,
) -> Result<IdentityClaims, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != "RS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let jwk = jwks
        .find_by_kid(&header.kid)
        .ok_or_else(|| Error::UnknownKid(header.kid.clone()))?;

    let verifying_key = VerifyingKey::<Sha256>::new(jwk.to_rsa_public_key()?);
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| Error::InvalidSignature)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: IdentityClaims = b64d_json(claims_b64)?;
    if claims.sub.is_empty() {
        return Err(Error::MissingSubject);
    }
    if claims.iss != expected_issuer {
        return Err(Error::InvalidIssuer);
    }
    if claims.aud != expected_audience {
        return Err(Error::InvalidAudience);
    }
    if claims.exp <= now_unix_seconds {
        return Err(Error::Expired);
    }

    Ok(claims)
}

/// Stateless bearer-token verifier for one issuer/audience pair.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    jwks: Jwks,
    issuer: String,
    audience: String,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(jwks: Jwks, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Verify a raw token string at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ExpiredToken`] for expiry and
    /// [`VerifyError::InvalidToken`] for every other validation failure.
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, VerifyError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a raw token string at an explicit point in time.
    ///
    /// # Errors
    ///
    /// Same classification as [`TokenVerifier::verify`].
    pub fn verify_at(&self, token: &str, now_unix_seconds: i64) -> Result<IdentityClaims, VerifyError> {
        match verify_rs256(token, &self.jwks, &self.issuer, &self.audience, now_unix_seconds) {
            Ok(claims) => Ok(claims),
            Err(Error::Expired) => Err(VerifyError::ExpiredToken),
            Err(err) => Err(VerifyError::InvalidToken(err)),
        }
    }

    /// Verify the value of an `Authorization` header.
    ///
    /// # Errors
    ///
    /// Fails with [`VerifyError::MissingToken`] when the header is absent and
    /// [`VerifyError::MalformedHeader`] when it is not `Bearer <token>`.
    pub fn verify_header(&self, header: Option<&str>) -> Result<IdentityClaims, VerifyError> {
        let header = header.ok_or(VerifyError::MissingToken)?;
        self.verify(parse_bearer(header)?)
    }

    /// Verify an `Authorization` header and additionally consult the issuer's
    /// revocation state for the token's subject.
    ///
    /// # Errors
    ///
    /// Fails with [`VerifyError::RevokedToken`] when the token was minted
    /// before the issuer's cut-off for this `uid`, plus every failure mode of
    /// [`TokenVerifier::verify_header`].
    pub async fn verify_header_checked(
        &self,
        header: Option<&str>,
        revocations: &dyn RevocationCheck,
    ) -> Result<IdentityClaims, VerifyError> {
        let claims = self.verify_header(header)?;
        if let Some(valid_after) = revocations.tokens_valid_after(claims.uid()).await {
            let minted_at = claims.auth_time.unwrap_or(claims.iat);
            if minted_at < valid_after {
                return Err(VerifyError::RevokedToken);
            }
        }
        Ok(claims)
    }
}

/// Extract the token from a `Bearer <token>` header value.
///
/// Anything other than exactly two whitespace-separated segments with a
/// (case-insensitive) `Bearer` scheme is malformed, which is distinct from a
/// token that fails verification.
fn parse_bearer(value: &str) -> Result<&str, VerifyError> {
    let mut parts = value.split_whitespace();
    let scheme = parts.next().ok_or(VerifyError::MalformedHeader)?;
    let token = parts.next().ok_or(VerifyError::MalformedHeader)?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(VerifyError::MalformedHeader);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PRIVATE_KEY_PEM: &str = include_str!("../../tests/data/test_signing_key.pem");

    const NOW: i64 = 1_700_000_000;
    const ISSUER: &str = "https://issuer.example.test";
    const AUDIENCE: &str = "portico-app";

    fn test_claims(uid: &str) -> IdentityClaims {
        IdentityClaims {
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            sub: uid.to_string(),
            iat: NOW,
            exp: NOW + 3600,
            auth_time: Some(NOW),
            email: Some("a@b.com".to_string()),
            email_verified: Some(false),
            name: Some("A B".to_string()),
            picture: None,
        }
    }

    fn verifier() -> TokenVerifier {
        let jwks = Jwks::from_rsa_private_key_pem(TEST_PRIVATE_KEY_PEM, "k1")
            .expect("test key should parse");
        TokenVerifier::new(jwks, ISSUER, AUDIENCE)
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[test]
    fn sign_and_verify_round_trip() -> Result<(), Error> {
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, "k1", &test_claims("u1"))?;
        let claims = verifier()
            .verify_at(&token, NOW)
            .expect("freshly minted token should verify");
        assert_eq!(claims.uid(), "u1");
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        Ok(())
    }

    #[test]
    fn expired_token_is_classified_as_expired() -> Result<(), Error> {
        let mut claims = test_claims("u1");
        claims.exp = NOW - 1;
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, "k1", &claims)?;
        let result = verifier().verify_at(&token, NOW);
        assert!(matches!(result, Err(VerifyError::ExpiredToken)));
        Ok(())
    }

    #[test]
    fn wrong_audience_is_invalid_not_expired() -> Result<(), Error> {
        let mut claims = test_claims("u1");
        claims.aud = "some-other-app".to_string();
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, "k1", &claims)?;
        let result = verifier().verify_at(&token, NOW);
        assert!(matches!(
            result,
            Err(VerifyError::InvalidToken(Error::InvalidAudience))
        ));
        Ok(())
    }

    #[test]
    fn wrong_issuer_is_rejected() -> Result<(), Error> {
        let mut claims = test_claims("u1");
        claims.iss = "https://rogue.example.test".to_string();
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, "k1", &claims)?;
        let result = verifier().verify_at(&token, NOW);
        assert!(matches!(
            result,
            Err(VerifyError::InvalidToken(Error::InvalidIssuer))
        ));
        Ok(())
    }

    #[test]
    fn tampered_payload_fails_signature_check() -> Result<(), Error> {
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, "k1", &test_claims("u1"))?;
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = b64e_json(&test_claims("attacker"))?;
        parts[1] = &forged;
        let forged_token = parts.join(".");
        let result = verifier().verify_at(&forged_token, NOW);
        assert!(matches!(
            result,
            Err(VerifyError::InvalidToken(Error::InvalidSignature))
        ));
        Ok(())
    }

    #[test]
    fn unknown_kid_is_rejected() -> Result<(), Error> {
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, "k2", &test_claims("u1"))?;
        let result = verifier().verify_at(&token, NOW);
        assert!(matches!(
            result,
            Err(VerifyError::InvalidToken(Error::UnknownKid(_)))
        ));
        Ok(())
    }

    #[test]
    fn header_parsing_distinguishes_missing_from_malformed() {
        let verifier = verifier();
        assert!(matches!(
            verifier.verify_header(None),
            Err(VerifyError::MissingToken)
        ));
        for malformed in ["token-without-scheme", "Basic abc", "Bearer a b", "Bearer"] {
            assert!(
                matches!(
                    verifier.verify_header(Some(malformed)),
                    Err(VerifyError::MalformedHeader)
                ),
                "expected malformed header for {malformed:?}"
            );
        }
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() -> Result<(), Error> {
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, "k1", &test_claims("u1"))?;
        // Still expired relative to the real clock; the point is the header
        // parse must not reject the lowercase scheme.
        let result = verifier().verify_header(Some(&format!("bearer {token}")));
        assert!(!matches!(result, Err(VerifyError::MalformedHeader)));
        Ok(())
    }

    struct FixedRevocation(Option<i64>);

    #[async_trait::async_trait]
    impl RevocationCheck for FixedRevocation {
        async fn tokens_valid_after(&self, _uid: &str) -> Option<i64> {
            self.0
        }
    }

    #[tokio::test]
    async fn revoked_token_is_rejected_after_cutoff() -> Result<(), Error> {
        let mut claims = test_claims("u1");
        claims.exp = Utc::now().timestamp() + 3600;
        claims.iat = Utc::now().timestamp() - 60;
        claims.auth_time = Some(claims.iat);
        let token = sign_rs256(TEST_PRIVATE_KEY_PEM, "k1", &claims)?;

        let verifier = verifier();
        let revoked = verifier
            .verify_header_checked(
                Some(&bearer(&token)),
                &FixedRevocation(Some(claims.iat + 30)),
            )
            .await;
        assert!(matches!(revoked, Err(VerifyError::RevokedToken)));

        let accepted = verifier
            .verify_header_checked(Some(&bearer(&token)), &FixedRevocation(None))
            .await;
        assert!(accepted.is_ok());
        Ok(())
    }
}
