//! Page context a session may attach to outgoing requests.

use serde::{Deserialize, Deserializer, Serialize};

/// Snapshot of the page a conversation is associated with.
///
/// While the page is still being fetched, title, hostname, and URL are
/// absent; resolution is observable via a dedicated change notification
/// distinct from turn/history changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SiteInfo {
    /// Page title, if resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Whether page content can be associated with the conversation at all.
    #[serde(default)]
    pub is_content_association_possible: bool,
    /// Page hostname, if resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Page URL, if resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// How much of the page content is used, in percent. Always within
    /// [0, 100]; out-of-range values are clamped at ingestion.
    #[serde(default = "default_percentage", deserialize_with = "clamp_percentage")]
    pub content_used_percentage: u8,
    /// Whether the page content has been refined (condensed) to fit.
    #[serde(default)]
    pub is_content_refined: bool,
}

fn default_percentage() -> u8 {
    100
}

fn clamp_percentage<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = u32::deserialize(deserializer)?;
    Ok(raw.min(100) as u8)
}

impl SiteInfo {
    /// Creates a resolved snapshot for a page, clamping the percentage into
    /// [0, 100].
    pub fn resolved(
        title: impl Into<String>,
        hostname: impl Into<String>,
        url: impl Into<String>,
        content_used_percentage: u32,
        is_content_refined: bool,
    ) -> Self {
        Self {
            title: Some(title.into()),
            is_content_association_possible: true,
            hostname: Some(hostname.into()),
            url: Some(url.into()),
            content_used_percentage: content_used_percentage.min(100) as u8,
            is_content_refined,
        }
    }

    /// Creates a snapshot for a page that is still being fetched.
    pub fn fetching() -> Self {
        Self {
            title: None,
            is_content_association_possible: true,
            hostname: None,
            url: None,
            content_used_percentage: 100,
            is_content_refined: false,
        }
    }

    /// Creates a snapshot for a context where association is not possible
    /// (e.g., an internal page).
    pub fn unlinkable() -> Self {
        Self {
            is_content_association_possible: false,
            ..Self::default()
        }
    }

    /// Whether the page has resolved far enough to be shown.
    pub fn is_resolved(&self) -> bool {
        self.title.is_some() || self.hostname.is_some()
    }
}
