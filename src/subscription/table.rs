//! Handle-to-subscription bookkeeping.

use crate::error::BridgeError;
use crate::subscription::listener::MessageListener;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque identifier for one callback subscription.
pub type SubscriptionHandle = u64;

struct SubscriptionEntry {
    channel: String,
    listener: Arc<dyn MessageListener>,
}

/// Maps handles to (channel, listener) pairs. Handles count up monotonically
/// and are never reused within a process lifetime, even after removal.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    next_handle: SubscriptionHandle,
    entries: HashMap<SubscriptionHandle, SubscriptionEntry>,
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &mut self,
        channel: &str,
        listener: Arc<dyn MessageListener>,
    ) -> SubscriptionHandle {
        self.next_handle += 1;
        self.entries.insert(
            self.next_handle,
            SubscriptionEntry {
                channel: channel.to_string(),
                listener,
            },
        );
        self.next_handle
    }

    /// Removes the entry, returning its pair so the caller can perform the
    /// transport-level unlisten.
    pub(crate) fn remove(
        &mut self,
        handle: SubscriptionHandle,
    ) -> Result<(String, Arc<dyn MessageListener>), BridgeError> {
        let entry = self
            .entries
            .remove(&handle)
            .ok_or(BridgeError::SubscriptionNotFound(handle))?;
        Ok((entry.channel, entry.listener))
    }

    /// Listeners registered for `channel`, in ascending handle order, which
    /// is registration order since handles count up.
    pub(crate) fn listeners_for(
        &self,
        channel: &str,
    ) -> Vec<(SubscriptionHandle, Arc<dyn MessageListener>)> {
        let mut matched: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.channel == channel)
            .map(|(handle, entry)| (*handle, entry.listener.clone()))
            .collect();
        matched.sort_by_key(|(handle, _)| *handle);
        matched
    }

    /// Every registered listener, in ascending handle order. Used for fault
    /// fan-out.
    pub(crate) fn all_listeners(&self) -> Vec<(SubscriptionHandle, Arc<dyn MessageListener>)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|(handle, entry)| (*handle, entry.listener.clone()))
            .collect();
        all.sort_by_key(|(handle, _)| *handle);
        all
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriptionTable;
    use crate::error::BridgeError;
    use crate::subscription::listener::{Delivery, MessageListener};
    use async_trait::async_trait;
    use std::sync::Arc;

    impl std::fmt::Debug for dyn MessageListener {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn MessageListener")
        }
    }

    struct NoopListener;

    #[async_trait]
    impl MessageListener for NoopListener {
        async fn on_delivery(&self, _delivery: Delivery) {}
    }

    #[test]
    fn handles_increase_monotonically_and_are_never_reused() {
        let mut table = SubscriptionTable::new();

        let first = table.add("events", Arc::new(NoopListener));
        let second = table.add("events", Arc::new(NoopListener));
        assert!(second > first);

        table.remove(first).unwrap();
        let third = table.add("events", Arc::new(NoopListener));
        assert!(third > second);
    }

    #[test]
    fn remove_returns_the_channel_for_transport_unlisten() {
        let mut table = SubscriptionTable::new();
        let handle = table.add("orders", Arc::new(NoopListener));

        let (channel, _listener) = table.remove(handle).unwrap();
        assert_eq!(channel, "orders");
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn remove_unknown_handle_fails_with_subscription_not_found() {
        let mut table = SubscriptionTable::new();
        let handle = table.add("events", Arc::new(NoopListener));
        table.remove(handle).unwrap();

        match table.remove(handle) {
            Err(BridgeError::SubscriptionNotFound(missing)) => assert_eq!(missing, handle),
            other => panic!("expected SubscriptionNotFound, got {other:?}"),
        }
    }

    #[test]
    fn listeners_for_filters_by_channel_in_registration_order() {
        let mut table = SubscriptionTable::new();
        let first = table.add("events", Arc::new(NoopListener));
        table.add("orders", Arc::new(NoopListener));
        let third = table.add("events", Arc::new(NoopListener));

        let handles: Vec<_> = table
            .listeners_for("events")
            .into_iter()
            .map(|(handle, _)| handle)
            .collect();
        assert_eq!(handles, vec![first, third]);
    }
}
