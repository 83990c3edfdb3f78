//! Model domain types.
//!
//! A model is either hosted by the service operator or a user-configured
//! custom endpoint. Models are identified process-wide by a unique key
//! string used for lookup and persistence.

use crate::premium::PremiumStatus;
use serde::{Deserialize, Serialize};

/// Which entitlement tier a model is available under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    /// Always usable.
    Basic,
    /// Usable by both basic and premium callers.
    BasicAndPremium,
    /// Usable only with an active premium entitlement.
    Premium,
}

impl AccessTier {
    /// Whether this tier is usable under the given entitlement status.
    ///
    /// `Unknown` is treated as not entitled: a premium model is unreachable
    /// until the entitlement has been positively confirmed.
    pub fn accessible_with(&self, status: PremiumStatus) -> bool {
        match self {
            AccessTier::Basic | AccessTier::BasicAndPremium => true,
            AccessTier::Premium => status == PremiumStatus::Active,
        }
    }
}

/// Coarse grouping of what a model is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    /// General conversation.
    Chat,
    /// Task-specific skills (rewrite, summarize).
    Skill,
}

/// A model hosted by the service operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedModel {
    /// Process-wide unique key (e.g., "chat-basic").
    pub key: String,
    /// Human-readable name for display.
    pub display_name: String,
    /// Organization that makes the model.
    pub maker: String,
    /// Name of the engine binding that serves this model.
    pub engine: String,
    /// What the model is for.
    pub category: ModelCategory,
    /// Entitlement tier gating access.
    pub access: AccessTier,
    /// Maximum page-content length (characters) the engine accepts.
    pub max_page_content_length: usize,
    /// Character count past which a long-conversation warning applies.
    pub long_conversation_warning_character_limit: usize,
}

/// A user-configured model reachable at a custom endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    /// Process-wide unique key.
    pub key: String,
    /// Model name sent in requests to the endpoint.
    pub request_name: String,
    /// Endpoint URL.
    pub endpoint: String,
    /// Optional credential for the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// A model available for selection: hosted or custom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    /// A model hosted by the service operator.
    Hosted(HostedModel),
    /// A user-configured custom endpoint.
    Custom(CustomModel),
}

impl Model {
    /// The process-wide unique key identifying this model.
    pub fn key(&self) -> &str {
        match self {
            Model::Hosted(m) => &m.key,
            Model::Custom(m) => &m.key,
        }
    }

    /// The entitlement tier gating this model.
    ///
    /// Custom models are always usable: the caller supplied the endpoint
    /// and credential themselves.
    pub fn access(&self) -> AccessTier {
        match self {
            Model::Hosted(m) => m.access,
            Model::Custom(_) => AccessTier::Basic,
        }
    }

    /// Whether this model is usable under the given entitlement status.
    pub fn accessible_with(&self, status: PremiumStatus) -> bool {
        self.access().accessible_with(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_accessibility() {
        assert!(AccessTier::Basic.accessible_with(PremiumStatus::Unknown));
        assert!(AccessTier::BasicAndPremium.accessible_with(PremiumStatus::Inactive));
        assert!(AccessTier::Premium.accessible_with(PremiumStatus::Active));
        assert!(!AccessTier::Premium.accessible_with(PremiumStatus::Inactive));
        assert!(!AccessTier::Premium.accessible_with(PremiumStatus::Unknown));
    }

    #[test]
    fn test_custom_model_always_accessible() {
        let model = Model::Custom(CustomModel {
            key: "my-ollama".to_string(),
            request_name: "llama3".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
        });
        assert!(model.accessible_with(PremiumStatus::Unknown));
    }
}
