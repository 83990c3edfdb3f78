//! Premium entitlement types.
//!
//! Entitlement is consumed as a queryable status; credential issuance is
//! out of scope. Consumers receive the status as a value snapshot so tests
//! can substitute arbitrary entitlement states deterministically.

use serde::{Deserialize, Serialize};

/// The caller's premium entitlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PremiumStatus {
    /// Entitlement has not been determined yet.
    Unknown,
    /// The caller holds no premium entitlement.
    Inactive,
    /// The caller holds an active premium entitlement.
    Active,
}

impl Default for PremiumStatus {
    fn default() -> Self {
        PremiumStatus::Unknown
    }
}

/// Details attached to an active premium entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumInfo {
    /// Remaining credential count.
    pub remaining_credentials: u32,
    /// Next renewal timestamp (ISO 8601 format). `None` means no further
    /// renewal is scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_active_at: Option<String>,
}
