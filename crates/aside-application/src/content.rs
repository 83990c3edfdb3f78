//! Content association tracking.
//!
//! Holds the page-derived context for a conversation, independently
//! updatable from the conversation's own turn stream. The snapshot is
//! replaceable only in whole; partial field updates are unrepresentable.

use aside_core::site_info::SiteInfo;

/// Tracks the page context currently associated with one session.
#[derive(Debug, Default)]
pub struct ContentAssociationTracker {
    site_info: Option<SiteInfo>,
    page_text: Option<String>,
}

impl ContentAssociationTracker {
    /// Creates a tracker with no associated content.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current page snapshot, if any.
    pub fn site_info(&self) -> Option<&SiteInfo> {
        self.site_info.as_ref()
    }

    /// The raw page text supplied by the host for engine requests.
    pub fn page_text(&self) -> Option<&str> {
        self.page_text.as_deref()
    }

    /// Replaces the whole snapshot.
    ///
    /// Returns whether the change is *meaningful* for suggestion
    /// generation: a different page (hostname change) or a reset of the
    /// content-used percentage. A title/URL resolution of the same page is
    /// not meaningful.
    pub fn replace(&mut self, site_info: SiteInfo, page_text: Option<String>) -> bool {
        let meaningful = match &self.site_info {
            None => true,
            Some(previous) => {
                previous.hostname != site_info.hostname
                    || (site_info.content_used_percentage == 100
                        && previous.content_used_percentage < 100)
            }
        };

        self.site_info = Some(site_info);
        self.page_text = page_text;
        meaningful
    }

    /// Whether content can currently be attached to engine requests.
    pub fn can_attach_content(&self) -> bool {
        self.site_info
            .as_ref()
            .is_some_and(|info| info.is_content_association_possible)
            && self.page_text.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_association_is_meaningful() {
        let mut tracker = ContentAssociationTracker::new();
        let meaningful = tracker.replace(
            SiteInfo::resolved("A", "a.com", "https://a.com", 100, false),
            Some("body".to_string()),
        );
        assert!(meaningful);
        assert!(tracker.can_attach_content());
    }

    #[test]
    fn test_same_page_resolution_is_not_meaningful() {
        let mut tracker = ContentAssociationTracker::new();
        tracker.replace(SiteInfo::fetching(), None);

        // fetching() has no hostname; neither does a second fetching swap.
        let meaningful = tracker.replace(SiteInfo::fetching(), None);
        assert!(!meaningful);
    }

    #[test]
    fn test_navigation_is_meaningful() {
        let mut tracker = ContentAssociationTracker::new();
        tracker.replace(
            SiteInfo::resolved("A", "a.com", "https://a.com", 100, false),
            Some("a".to_string()),
        );
        let meaningful = tracker.replace(
            SiteInfo::resolved("B", "b.com", "https://b.com", 100, false),
            Some("b".to_string()),
        );
        assert!(meaningful);
    }

    #[test]
    fn test_percentage_reset_is_meaningful() {
        let mut tracker = ContentAssociationTracker::new();
        tracker.replace(
            SiteInfo::resolved("A", "a.com", "https://a.com", 40, true),
            Some("a".to_string()),
        );
        let meaningful = tracker.replace(
            SiteInfo::resolved("A", "a.com", "https://a.com", 100, false),
            Some("a".to_string()),
        );
        assert!(meaningful);
    }

    #[test]
    fn test_unlinkable_page_cannot_attach() {
        let mut tracker = ContentAssociationTracker::new();
        tracker.replace(SiteInfo::unlinkable(), Some("ignored".to_string()));
        assert!(!tracker.can_attach_content());
    }
}
