//! Per-transition push-token lifecycle.
//!
//! Tracks the previously observed identity and the token currently registered
//! for this device, so login/logout transitions and token rotations resolve
//! against explicit state instead of ambient globals. The owner (the session
//! manager) awaits each handler before processing the next identity change,
//! which serializes registration against cleanup for the same device token.

use std::sync::Arc;
use tracing::{debug, error};

use crate::issuer::Identity;
use crate::store::{DocumentStore, StoreError};

use super::{DeviceTokenRegistry, PushTransport};

pub struct PushTokenTracker {
    registry: DeviceTokenRegistry,
    transport: Arc<dyn PushTransport>,
    current_token: Option<String>,
    previous_uid: Option<String>,
}

impl PushTokenTracker {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            registry: DeviceTokenRegistry::new(store),
            transport,
            current_token: None,
            previous_uid: None,
        }
    }

    #[must_use]
    pub fn current_token(&self) -> Option<&str> {
        self.current_token.as_deref()
    }

    /// React to an identity transition.
    ///
    /// Keyed on the transition itself: login registers the device token for
    /// the new identity, logout unregisters it for the previous one, and an
    /// account switch does both. Repeated observations of the same identity
    /// are a no-op. Failures never propagate; sign-in and sign-out complete
    /// regardless.
    pub async fn handle_transition(&mut self, user: Option<&Identity>) {
        let current_uid = user.map(|identity| identity.uid.clone());
        if current_uid == self.previous_uid {
            return;
        }

        // Cleanup for the identity this device no longer belongs to.
        if let Some(previous) = self.previous_uid.take() {
            if let Some(token) = self.current_token.take() {
                self.registry.unregister(&previous, &token).await;
            }
            self.transport.invalidate().await;
        }

        if let Some(uid) = &current_uid {
            match self.transport.device_token().await {
                Some(token) => {
                    if let Err(err) = self.registry.register(uid, &token).await {
                        error!("failed to register device token for {uid}: {err}");
                    }
                    self.current_token = Some(token);
                }
                None => debug!("no device token available, push disabled for {uid}"),
            }
        }

        self.previous_uid = current_uid;
    }

    /// React to a transport token rotation.
    ///
    /// The superseded token is removed best-effort; the replacement is
    /// registered even when removal failed.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the new-token registration.
    pub async fn handle_refresh(&mut self, new_token: String) -> Result<(), StoreError> {
        let old_token = self.current_token.replace(new_token.clone());
        let Some(uid) = self.previous_uid.clone() else {
            // Signed out: nothing registered, just remember the fresh token.
            return Ok(());
        };
        self.registry
            .refresh(&uid, old_token.as_deref(), &new_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::StaticTransport;
    use crate::profile::USERS_COLLECTION;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            email: Some(format!("{uid}@example.com")),
            email_verified: false,
            display_name: None,
            photo_url: None,
            provider_ids: BTreeSet::new(),
            creation_time: Utc::now(),
            last_sign_in_time: Utc::now(),
        }
    }

    async fn device_tokens(store: &MemoryStore, uid: &str) -> serde_json::Value {
        store
            .get(USERS_COLLECTION, uid)
            .await
            .expect("store online")
            .expect("document exists")
            .get("deviceTokens")
            .cloned()
            .unwrap_or(json!([]))
    }

    #[tokio::test]
    async fn login_registers_and_logout_unregisters() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.set(USERS_COLLECTION, "u1", Vec::new()).await?;
        let transport = Arc::new(StaticTransport::with_token("t1"));
        let mut tracker = PushTokenTracker::new(store.clone(), transport.clone());

        tracker.handle_transition(Some(&identity("u1"))).await;
        assert_eq!(device_tokens(&store, "u1").await, json!(["t1"]));
        assert_eq!(tracker.current_token(), Some("t1"));

        tracker.handle_transition(None).await;
        assert_eq!(device_tokens(&store, "u1").await, json!([]));
        assert_eq!(tracker.current_token(), None);
        // Transport token dropped so the device stops receiving pushes.
        assert_eq!(transport.device_token().await, None);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_observation_of_same_identity_is_a_noop() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.set(USERS_COLLECTION, "u1", Vec::new()).await?;
        let transport = Arc::new(StaticTransport::with_token("t1"));
        let mut tracker = PushTokenTracker::new(store.clone(), transport);

        let user = identity("u1");
        tracker.handle_transition(Some(&user)).await;
        tracker.handle_transition(Some(&user)).await;
        assert_eq!(device_tokens(&store, "u1").await, json!(["t1"]));
        Ok(())
    }

    #[tokio::test]
    async fn account_switch_moves_the_token() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.set(USERS_COLLECTION, "u1", Vec::new()).await?;
        store.set(USERS_COLLECTION, "u2", Vec::new()).await?;
        let transport = Arc::new(StaticTransport::with_token("t1"));
        let mut tracker = PushTokenTracker::new(store.clone(), transport.clone());

        tracker.handle_transition(Some(&identity("u1"))).await;
        // A fresh token appears after the invalidation of the old one.
        transport.rotate("t2");
        tracker.handle_transition(Some(&identity("u2"))).await;

        assert_eq!(device_tokens(&store, "u1").await, json!([]));
        assert_eq!(device_tokens(&store, "u2").await, json!(["t2"]));
        Ok(())
    }

    #[tokio::test]
    async fn logout_completes_despite_store_outage() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.set(USERS_COLLECTION, "u1", Vec::new()).await?;
        let transport = Arc::new(StaticTransport::with_token("t1"));
        let mut tracker = PushTokenTracker::new(store.clone(), transport.clone());

        tracker.handle_transition(Some(&identity("u1"))).await;
        store.set_offline(true);
        tracker.handle_transition(None).await;

        // Cleanup failed silently; local state and the transport still reset.
        assert_eq!(tracker.current_token(), None);
        assert_eq!(transport.device_token().await, None);
        store.set_offline(false);
        assert_eq!(device_tokens(&store, "u1").await, json!(["t1"]));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_while_signed_in_swaps_tokens() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.set(USERS_COLLECTION, "u1", Vec::new()).await?;
        let transport = Arc::new(StaticTransport::with_token("t1"));
        let mut tracker = PushTokenTracker::new(store.clone(), transport);

        tracker.handle_transition(Some(&identity("u1"))).await;
        tracker.handle_refresh("t2".to_string()).await?;

        assert_eq!(device_tokens(&store, "u1").await, json!(["t2"]));
        assert_eq!(tracker.current_token(), Some("t2"));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_while_signed_out_only_remembers_the_token() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(StaticTransport::none());
        let mut tracker = PushTokenTracker::new(store, transport);
        tracker.handle_refresh("t9".to_string()).await?;
        assert_eq!(tracker.current_token(), Some("t9"));
        Ok(())
    }
}
