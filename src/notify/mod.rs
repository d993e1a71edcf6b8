//! Push device-token registry.
//!
//! Maintains the `deviceTokens` set on each profile document. Registration is
//! higher priority than cleanup: a failed unregister is logged and swallowed
//! (it must never block sign-out), while a failed register propagates so the
//! caller can retry or surface a "notifications not enabled" state.

use std::sync::Arc;
use tracing::{debug, error};

use crate::store::{DocumentStore, FieldOp, StoreError};
use crate::profile::USERS_COLLECTION;

mod tracker;

pub use tracker::PushTokenTracker;

/// Push-transport contract: obtains and invalidates the opaque device token
/// for this (device, app-install) pair. The delivery side is out of scope.
#[async_trait::async_trait]
pub trait PushTransport: Send + Sync {
    /// Request permission if needed and return the current device token, or
    /// `None` when permission was denied or no token is available.
    async fn device_token(&self) -> Option<String>;

    /// Drop the transport-side token after logout so the device stops
    /// receiving pushes addressed to the previous identity.
    async fn invalidate(&self);
}

/// Fixed-token transport for tests and platforms without push support.
#[derive(Default)]
pub struct StaticTransport {
    token: std::sync::Mutex<Option<String>>,
}

impl StaticTransport {
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: std::sync::Mutex::new(Some(token.into())),
        }
    }

    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Replace the transport token, as a rotation event would.
    pub fn rotate(&self, token: impl Into<String>) {
        *self.token.lock().expect("transport lock poisoned") = Some(token.into());
    }
}

#[async_trait::async_trait]
impl PushTransport for StaticTransport {
    async fn device_token(&self) -> Option<String> {
        self.token.lock().expect("transport lock poisoned").clone()
    }

    async fn invalidate(&self) {
        self.token.lock().expect("transport lock poisoned").take();
    }
}

/// Set-semantics membership of device tokens per identity.
#[derive(Clone)]
pub struct DeviceTokenRegistry {
    store: Arc<dyn DocumentStore>,
}

impl DeviceTokenRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Add `token` to the identity's `deviceTokens` set. Adding a token that
    /// is already present is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates store failures (including a missing profile document) so
    /// the caller can retry; callers must not let this block sign-in.
    pub async fn register(&self, uid: &str, token: &str) -> Result<(), StoreError> {
        self.store
            .update(
                USERS_COLLECTION,
                uid,
                vec![(
                    "deviceTokens".into(),
                    FieldOp::ArrayUnion(vec![token.to_string()]),
                )],
            )
            .await?;
        debug!("device token registered for {uid}");
        Ok(())
    }

    /// Remove `token` from the identity's set. Removing an absent token is a
    /// no-op; store failures are logged and swallowed so cleanup never blocks
    /// a sign-out flow.
    pub async fn unregister(&self, uid: &str, token: &str) {
        let result = self
            .store
            .update(
                USERS_COLLECTION,
                uid,
                vec![(
                    "deviceTokens".into(),
                    FieldOp::ArrayRemove(vec![token.to_string()]),
                )],
            )
            .await;
        if let Err(err) = result {
            error!("failed to unregister device token for {uid}: {err}");
        }
    }

    /// Handle a transport token rotation: drop the old token (best effort)
    /// and register the replacement. The registration proceeds even when the
    /// old-token removal failed.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the new-token registration only.
    pub async fn refresh(
        &self,
        uid: &str,
        old_token: Option<&str>,
        new_token: &str,
    ) -> Result<(), StoreError> {
        if let Some(old) = old_token {
            self.unregister(uid, old).await;
        }
        self.register(uid, new_token).await
    }
}
