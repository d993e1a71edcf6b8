//! JWKS handling for the issuer's RS256 public signing material.
//!
//! The verifier only needs the public half; the private-key helpers exist so
//! the in-memory issuer and the test suite can derive a matching keyset.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::Error;

/// Issuer key set, in standard JWKS JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    pub n: String,
    pub e: String,
}

impl Jwks {
    /// Parse a key set from JWKS JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid JWKS JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }

    /// Build a single-key set from an RSA public key in PEM form.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM cannot be parsed as an RSA public key.
    pub fn from_rsa_public_key_pem(pem: &str, kid: impl Into<String>) -> Result<Self, Error> {
        let public_key = decode_public_key(pem)?;
        Ok(Self {
            keys: vec![Jwk::from_rsa_public_key(&public_key, kid)],
        })
    }

    /// Build a single-key set from an RSA private key in PEM form, deriving
    /// the public half.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM cannot be parsed as an RSA private key.
    pub fn from_rsa_private_key_pem(pem: &str, kid: impl Into<String>) -> Result<Self, Error> {
        let private_key = decode_private_key(pem)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            keys: vec![Jwk::from_rsa_public_key(&public_key, kid)],
        })
    }
}

impl Jwk {
    #[must_use]
    pub fn from_rsa_public_key(public_key: &RsaPublicKey, kid: impl Into<String>) -> Self {
        Self {
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            kid: kid.into(),
            n: Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be()),
            e: Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be()),
        }
    }

    /// Reconstruct the RSA public key from the JWK components.
    ///
    /// # Errors
    ///
    /// Returns an error if `n`/`e` are not valid base64url or do not form a
    /// usable RSA key.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, Error> {
        let n = Base64UrlUnpadded::decode_vec(&self.n).map_err(|_| Error::Base64)?;
        let e = Base64UrlUnpadded::decode_vec(&self.e).map_err(|_| Error::Base64)?;
        RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(Error::Rsa)
    }
}

pub(super) fn decode_private_key(pem: &str) -> Result<RsaPrivateKey, Error> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(key);
    }
    Err(Error::KeyParse)
}

fn decode_public_key(pem: &str) -> Result<RsaPublicKey, Error> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(key);
    }
    if let Ok(key) = RsaPublicKey::from_pkcs1_pem(pem) {
        return Ok(key);
    }
    Err(Error::KeyParse)
}
