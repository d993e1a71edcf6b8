//! Best-effort public-IP lookup.
//!
//! Advisory only: the result is recorded on the profile document for audit
//! purposes and is spoofable/proxy-dependent. Failures never block sign-up or
//! sign-in; callers fall back to [`UNKNOWN_IP`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Sentinel recorded when the lookup fails or times out.
pub const UNKNOWN_IP: &str = "unknown";

const DEFAULT_ENDPOINT: &str = "https://api.ipify.org?format=json";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait::async_trait]
pub trait IpLookup: Send + Sync {
    async fn public_ip(&self) -> Result<String>;
}

/// reqwest-based lookup against an ipify-compatible endpoint.
pub struct IpifyClient {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(Deserialize)]
struct IpifyResponse {
    ip: String,
}

impl IpifyClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        let endpoint = Url::parse(DEFAULT_ENDPOINT).context("invalid default IP endpoint")?;
        Self::with_endpoint(endpoint)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_endpoint(endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .context("failed to build IP lookup client")?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait::async_trait]
impl IpLookup for IpifyClient {
    async fn public_ip(&self) -> Result<String> {
        let response: IpifyResponse = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .context("IP lookup request failed")?
            .json()
            .await
            .context("IP lookup returned invalid payload")?;
        Ok(response.ip)
    }
}

/// Fixed-answer lookup for tests and environments without egress.
pub struct FixedIp(pub String);

#[async_trait::async_trait]
impl IpLookup for FixedIp {
    async fn public_ip(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
