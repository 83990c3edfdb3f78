//! Observer fan-out layer.
//!
//! Delivers state-change notifications to all currently bound observers
//! without blocking the mutator: each observer gets its own unbounded
//! channel, so a slow observer can never stall conversation progress.
//! Closed channels are reaped on the next notify.

use aside_core::error::ApiErrorKind;
use aside_core::site_info::SiteInfo;
use aside_core::suggestion::SuggestionStatus;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Handle identifying one bound observer.
pub type ObserverId = u64;

/// Push events scoped to one conversation session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    /// The turn history changed (append, event, edit, removal).
    HistoryUpdated,
    /// An engine request started or finished.
    RequestInProgressChanged(bool),
    /// The session's error state changed.
    ResponseErrorChanged(Option<ApiErrorKind>),
    /// The selected model changed.
    ModelDataChanged { model_key: String },
    /// Follow-up question generation produced a result or changed status.
    SuggestedQuestionsChanged {
        questions: Vec<String>,
        status: SuggestionStatus,
    },
    /// The associated page context was replaced.
    AssociatedContentChanged(SiteInfo),
    /// The page favicon changed (forwarded from the host; never produced
    /// here).
    FaviconChanged { url: String },
}

/// Push events scoped to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceNotification {
    /// The set of visible conversations changed.
    ConversationListChanged,
    /// The usage agreement was accepted.
    AgreementAccepted,
    /// The host-UI default conversation changed.
    DefaultConversationChanged { conversation_id: String },
}

/// Registry of observer channels keyed by a connection handle.
///
/// Listener count is unbounded and churns with UI lifecycle, so channels
/// are held in a map and removed automatically once their receiver is
/// dropped.
pub struct ObserverHub<N> {
    next_id: AtomicU64,
    channels: Mutex<HashMap<ObserverId, mpsc::UnboundedSender<N>>>,
}

impl<N: Clone> ObserverHub<N> {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Binds a new observer and returns its handle plus the receiving end
    /// of its channel.
    pub fn subscribe(&self) -> (ObserverId, mpsc::UnboundedReceiver<N>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut channels = self.channels.lock().expect("observer hub lock poisoned");
        channels.insert(id, tx);
        (id, rx)
    }

    /// Unbinds an observer explicitly.
    pub fn unsubscribe(&self, id: ObserverId) {
        let mut channels = self.channels.lock().expect("observer hub lock poisoned");
        channels.remove(&id);
    }

    /// Delivers a notification to every bound observer.
    ///
    /// Never blocks: sends go through unbounded channels. Observers whose
    /// receiver has been dropped are removed here.
    pub fn notify(&self, notification: N) {
        let mut channels = self.channels.lock().expect("observer hub lock poisoned");
        channels.retain(|id, tx| {
            let delivered = tx.send(notification.clone()).is_ok();
            if !delivered {
                tracing::debug!("Removing disconnected observer {}", id);
            }
            delivered
        });
    }

    /// Number of currently bound observers.
    pub fn observer_count(&self) -> usize {
        self.channels.lock().expect("observer hub lock poisoned").len()
    }
}

impl<N: Clone> Default for ObserverHub<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_all_observers() {
        let hub: ObserverHub<ServiceNotification> = ObserverHub::new();
        let (_id_a, mut rx_a) = hub.subscribe();
        let (_id_b, mut rx_b) = hub.subscribe();

        hub.notify(ServiceNotification::ConversationListChanged);

        assert_eq!(
            rx_a.recv().await,
            Some(ServiceNotification::ConversationListChanged)
        );
        assert_eq!(
            rx_b.recv().await,
            Some(ServiceNotification::ConversationListChanged)
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_reaped() {
        let hub: ObserverHub<ServiceNotification> = ObserverHub::new();
        let (_id_a, rx_a) = hub.subscribe();
        let (_id_b, mut rx_b) = hub.subscribe();
        assert_eq!(hub.observer_count(), 2);

        drop(rx_a);
        hub.notify(ServiceNotification::AgreementAccepted);

        assert_eq!(hub.observer_count(), 1);
        assert_eq!(
            rx_b.recv().await,
            Some(ServiceNotification::AgreementAccepted)
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel() {
        let hub: ObserverHub<ServiceNotification> = ObserverHub::new();
        let (id, mut rx) = hub.subscribe();

        hub.unsubscribe(id);
        hub.notify(ServiceNotification::ConversationListChanged);

        assert_eq!(rx.recv().await, None);
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_notify_does_not_block_on_unread_observer() {
        let hub: ObserverHub<ServiceNotification> = ObserverHub::new();
        let (_id, mut rx) = hub.subscribe();

        // An observer that never drains still cannot stall the producer.
        for _ in 0..1_000 {
            hub.notify(ServiceNotification::ConversationListChanged);
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 1_000);
    }
}
