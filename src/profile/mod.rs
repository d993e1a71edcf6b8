//! Profile-document synchronizer.
//!
//! Reconciles issuer identities with the durable per-`uid` document in the
//! `users` collection: a fresh create at sign-up, a liveness stamp
//! (`updatedAt`/`ipLastLogin`) on every subsequent sign-in. A sign-in racing
//! ahead of the sign-up write observes "not found" and no-ops; the later
//! create still lands because both writers use field-level updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::store::{DocumentStore, FieldOp, StoreError};

mod ip;

pub use ip::{FixedIp, IpLookup, IpifyClient, UNKNOWN_IP};

pub const USERS_COLLECTION: &str = "users";

/// Wire shape of a profile document (camelCase field names in the store).
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileDocument {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub ip_signup: String,
    pub ip_last_login: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub accepted_terms_at: Option<DateTime<Utc>>,
    pub accepted_privacy_policy_at: Option<DateTime<Utc>>,
    pub accepted_marketing_at: Option<DateTime<Utc>>,
    pub device_tokens: Vec<String>,
}

/// Input collected by the sign-up form.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub accepted_marketing: bool,
}

pub struct ProfileSync {
    store: Arc<dyn DocumentStore>,
    ip: Arc<dyn IpLookup>,
}

impl ProfileSync {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, ip: Arc<dyn IpLookup>) -> Self {
        Self { store, ip }
    }

    /// Create the profile document for a freshly signed-up identity.
    ///
    /// Timestamps are stamped server-side; `acceptedMarketingAt` stays null
    /// unless the flag was accepted. The IP is best-effort and degrades to
    /// the [`UNKNOWN_IP`] sentinel.
    ///
    /// # Errors
    ///
    /// Propagates store failures; the caller decides whether those abort the
    /// sign-up flow (they must not undo the issuer account).
    #[instrument(skip(self, profile))]
    pub async fn create_profile(&self, uid: &str, profile: NewProfile) -> Result<(), StoreError> {
        let ip = self.resolve_ip().await;
        let marketing = if profile.accepted_marketing {
            FieldOp::ServerTimestamp
        } else {
            FieldOp::Set(Value::Null)
        };
        self.store
            .set(
                USERS_COLLECTION,
                uid,
                vec![
                    ("firstName".into(), FieldOp::Set(json!(profile.first_name))),
                    ("lastName".into(), FieldOp::Set(json!(profile.last_name))),
                    ("email".into(), FieldOp::Set(json!(profile.email))),
                    (
                        "phoneNumber".into(),
                        FieldOp::Set(json!(profile.phone_number)),
                    ),
                    ("ipSignup".into(), FieldOp::Set(json!(ip))),
                    ("ipLastLogin".into(), FieldOp::Set(json!(ip))),
                    ("createdAt".into(), FieldOp::ServerTimestamp),
                    ("updatedAt".into(), FieldOp::ServerTimestamp),
                    ("acceptedTermsAt".into(), FieldOp::ServerTimestamp),
                    ("acceptedPrivacyPolicyAt".into(), FieldOp::ServerTimestamp),
                    ("acceptedMarketingAt".into(), marketing),
                ],
            )
            .await
    }

    /// Stamp `updatedAt`/`ipLastLogin` for an observed sign-in.
    ///
    /// A missing document is an expected race during sign-up, not a fault:
    /// it is logged and swallowed.
    ///
    /// # Errors
    ///
    /// Propagates store failures other than "not found".
    #[instrument(skip(self))]
    pub async fn record_sign_in(&self, uid: &str) -> Result<(), StoreError> {
        let ip = self.resolve_ip().await;
        let result = self
            .store
            .update(
                USERS_COLLECTION,
                uid,
                vec![
                    ("ipLastLogin".into(), FieldOp::Set(json!(ip))),
                    ("updatedAt".into(), FieldOp::ServerTimestamp),
                ],
            )
            .await;
        match result {
            Err(err) if err.is_not_found() => {
                debug!("profile document for {uid} not created yet, skipping sign-in stamp");
                Ok(())
            }
            other => other,
        }
    }

    /// # Errors
    ///
    /// Propagates store failures; an absent document is `Ok(None)`.
    pub async fn get_profile(&self, uid: &str) -> Result<Option<ProfileDocument>, StoreError> {
        let Some(document) = self.store.get(USERS_COLLECTION, uid).await? else {
            return Ok(None);
        };
        serde_json::from_value(Value::Object(document))
            .map(Some)
            .map_err(|err| StoreError::Backend(format!("malformed profile document: {err}")))
    }

    async fn resolve_ip(&self) -> String {
        match self.ip.public_ip().await {
            Ok(ip) => ip,
            Err(err) => {
                warn!("IP lookup failed: {err:#}");
                UNKNOWN_IP.to_string()
            }
        }
    }
}
