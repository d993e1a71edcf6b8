//! Derived session state.
//!
//! The session is a pure projection of the issuer's identity stream: a
//! background task subscribes to the issuer, runs the side effects a sign-in
//! or sign-out transition requires, and only then publishes the new
//! [`Session`]. Subscribers therefore never observe a session whose side
//! effects have not at least been attempted.

pub mod guard;

pub use guard::{route_decision, RouteDecision};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::issuer::{Identity, Issuer};
use crate::notify::PushTokenTracker;
use crate::profile::ProfileSync;

/// Snapshot of the authenticated session.
///
/// `loading` is true only during bootstrap, before the issuer has reported
/// its initial state. It transitions to false exactly once and never back.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: Option<Identity>,
    pub loading: bool,
}

impl Session {
    fn bootstrapping() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

/// Owns the background task that mirrors issuer state into [`Session`]
/// snapshots. Dropping the manager aborts the task.
pub struct SessionManager {
    rx: watch::Receiver<Session>,
    task: JoinHandle<()>,
}

impl SessionManager {
    /// Subscribe to the issuer and start publishing sessions.
    ///
    /// The issuer's current state counts as the first notification, so the
    /// loading flag clears even when nobody is signed in.
    pub fn spawn(
        issuer: Arc<dyn Issuer>,
        profiles: Arc<ProfileSync>,
        mut push: PushTokenTracker,
    ) -> Self {
        let (tx, rx) = watch::channel(Session::bootstrapping());
        let mut identities = issuer.state_changes();
        let task = tokio::spawn(async move {
            let mut previous_uid: Option<String> = None;
            loop {
                let user = identities.borrow_and_update().clone();
                apply_transition(&tx, &profiles, &mut push, &mut previous_uid, user).await;
                if identities.changed().await.is_err() {
                    debug!("identity stream closed, session task exiting");
                    break;
                }
            }
        });
        Self { rx, task }
    }

    /// Current session snapshot.
    pub fn session(&self) -> Session {
        self.rx.borrow().clone()
    }

    /// New receiver for session updates.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.rx.clone()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run the side effects a state transition requires, then publish.
///
/// Side-effect failures are logged and swallowed: the session must follow
/// the issuer regardless of store or lookup availability.
async fn apply_transition(
    tx: &watch::Sender<Session>,
    profiles: &ProfileSync,
    push: &mut PushTokenTracker,
    previous_uid: &mut Option<String>,
    user: Option<Identity>,
) {
    let current_uid = user.as_ref().map(|identity| identity.uid.clone());
    let signed_in = current_uid.is_some() && current_uid != *previous_uid;

    push.handle_transition(user.as_ref()).await;

    if signed_in {
        if let Some(uid) = current_uid.as_deref() {
            if let Err(err) = profiles.record_sign_in(uid).await {
                warn!(uid, %err, "failed to record sign-in on profile");
            }
        }
    }

    *previous_uid = current_uid;
    tx.send_replace(Session {
        user,
        loading: false,
    });
}
