//! # Portico (authenticated-session starter)
//!
//! `portico` pre-wires the authenticated-session and protected-resource-access
//! model of a full-stack application: credential exchange with an external
//! identity issuer, client session state, bearer-token verification on the
//! server, profile-document reconciliation, and push device-token lifecycle.
//!
//! ## Identity model
//!
//! The external issuer is the single source of truth for accounts, keyed by a
//! stable `uid`. It mints short-lived RS256 identity tokens; this crate never
//! stores server-side sessions and verifies every request statelessly against
//! the issuer's JWKS.
//!
//! ## Derived state
//!
//! Each identity owns at most one profile document in the `users` collection
//! of the document store, plus a set of push device tokens. Both are derived
//! state: they may lag the issuer (a profile document can be momentarily
//! absent right after sign-up) and every consumer treats that as a transient
//! condition, never as an authorization failure.

pub mod api;
pub mod cli;
pub mod issuer;
pub mod notify;
pub mod profile;
pub mod session;
pub mod store;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
