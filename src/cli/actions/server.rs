use crate::api::{self, ApiState};
use crate::cli::actions::Action;
use crate::profile::{IpifyClient, ProfileSync};
use crate::store::MemoryStore;
use crate::token::{Jwks, TokenVerifier};
use anyhow::{Context, Result};
use std::{fs, sync::Arc};
use tracing::debug;

/// Handle the server action
/// # Errors
/// Returns an error if the JWKS file cannot be loaded or the server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            jwks,
            issuer,
            audience,
        } => {
            let keyset_json = fs::read_to_string(&jwks)
                .with_context(|| format!("Failed to read JWKS file: {jwks}"))?;
            let keyset = Jwks::from_json(&keyset_json)
                .with_context(|| format!("Failed to parse JWKS file: {jwks}"))?;

            debug!("Loaded {} signing key(s) from {}", keyset.keys.len(), jwks);

            let verifier = TokenVerifier::new(keyset, issuer, audience);
            let store = Arc::new(MemoryStore::new());
            let ip = Arc::new(IpifyClient::new()?);
            let profiles = Arc::new(ProfileSync::new(store.clone(), ip));

            let state = Arc::new(ApiState {
                verifier,
                revocations: None,
                profiles,
                store,
            });

            api::new(port, state).await?;
        }
    }

    Ok(())
}
