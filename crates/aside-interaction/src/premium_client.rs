//! Premium entitlement lookup.
//!
//! Entitlement issuance is out of scope; this client only reads the
//! caller's current status from the entitlement endpoint.

use crate::EngineError;
use aside_core::premium::{PremiumInfo, PremiumStatus};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// One fetched view of the caller's entitlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremiumSnapshot {
    /// The entitlement status.
    pub status: PremiumStatus,
    /// Details, present only for an active entitlement.
    pub info: Option<PremiumInfo>,
}

impl PremiumSnapshot {
    /// A snapshot for an undetermined entitlement.
    pub fn unknown() -> Self {
        Self {
            status: PremiumStatus::Unknown,
            info: None,
        }
    }
}

/// Read-only client for the caller's premium entitlement status.
#[async_trait]
pub trait PremiumClient: Send + Sync {
    /// Fetches the current entitlement snapshot.
    async fn fetch_status(&self) -> Result<PremiumSnapshot, EngineError>;
}

/// HTTP implementation of [`PremiumClient`].
#[derive(Clone)]
pub struct HttpPremiumClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpPremiumClient {
    /// Creates a new client against the given entitlement endpoint.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct PremiumStatusResponse {
    status: PremiumStatus,
    #[serde(default)]
    remaining_credentials: u32,
    #[serde(default)]
    next_active_at: Option<String>,
}

#[async_trait]
impl PremiumClient for HttpPremiumClient {
    async fn fetch_status(&self) -> Result<PremiumSnapshot, EngineError> {
        let url = format!("{}/premium/status", self.endpoint);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|err| EngineError::Connection {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(EngineError::Other(format!(
                "Entitlement endpoint returned {}",
                response.status()
            )));
        }

        let parsed: PremiumStatusResponse = response.json().await.map_err(|err| {
            EngineError::Other(format!("Failed to parse entitlement response: {err}"))
        })?;

        let info = match parsed.status {
            PremiumStatus::Active => Some(PremiumInfo {
                remaining_credentials: parsed.remaining_credentials,
                next_active_at: parsed.next_active_at,
            }),
            _ => None,
        };

        Ok(PremiumSnapshot {
            status: parsed.status,
            info,
        })
    }
}
