//! Post-connect lifecycle watcher.

use crate::connection::lifecycle::ConnectionLifecycle;
use crate::error::BridgeError;
use crate::observability::{components, events};
use crate::queue::notification_queue::NotificationQueue;
use crate::subscription::listener::Delivery;
use crate::subscription::table::SubscriptionTable;
use crate::transport::LifecycleEvent;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub(crate) type QueueRegistry = Arc<Mutex<Vec<Weak<NotificationQueue>>>>;

/// Watches the lifecycle stream after a successful connect. Later
/// `Connected` events (the transport reconnected on its own) trigger
/// re-LISTEN of every tracked channel; a terminal `Error` marks the
/// lifecycle failed, fans the fault out to every callback subscription, and
/// fails every live pull queue. The connect race is never re-run.
pub(crate) fn spawn_lifecycle_watcher(
    connection: Arc<ConnectionLifecycle>,
    mut lifecycle: broadcast::Receiver<LifecycleEvent>,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    queues: QueueRegistry,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match lifecycle.recv().await {
                Ok(LifecycleEvent::Connected) => {
                    info!(
                        event = events::RELISTEN_AFTER_RECONNECT,
                        component = components::WATCHER,
                        "transport reconnected; re-establishing LISTEN"
                    );
                    if let Err(relisten_error) = connection.relisten_all().await {
                        warn!(
                            component = components::WATCHER,
                            error = %relisten_error,
                            "re-LISTEN after reconnect failed"
                        );
                    }
                }
                Ok(LifecycleEvent::Reconnect) => {
                    debug!(
                        component = components::WATCHER,
                        "transport is reconnecting"
                    );
                }
                Ok(LifecycleEvent::Error(fault)) => {
                    connection.record_fault(fault.clone()).await;
                    error!(
                        event = events::FAULT_FANOUT,
                        component = components::WATCHER,
                        error = %fault,
                        "terminal transport error; bridge is unusable"
                    );

                    let listeners = subscriptions.lock().await.all_listeners();
                    for (_, listener) in listeners {
                        listener.on_delivery(Delivery::Fault(fault.clone())).await;
                    }

                    let registered = queues.lock().await;
                    for queue in registered.iter().filter_map(Weak::upgrade) {
                        queue
                            .fail(BridgeError::ConnectionFatal(fault.clone()))
                            .await;
                    }
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        component = components::WATCHER,
                        skipped, "lifecycle event stream lagged"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::spawn_lifecycle_watcher;
    use crate::connection::lifecycle::{ConnectionLifecycle, ConnectionState};
    use crate::error::TransportError;
    use crate::queue::notification_queue::NotificationQueue;
    use crate::subscription::listener::{Delivery, MessageListener};
    use crate::subscription::table::SubscriptionTable;
    use crate::transport::{InMemoryTransport, LifecycleEvent, NotifyTransport};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    struct RecordingListener {
        deliveries: mpsc::UnboundedSender<Delivery>,
    }

    #[async_trait]
    impl MessageListener for RecordingListener {
        async fn on_delivery(&self, delivery: Delivery) {
            let _ = self.deliveries.send(delivery);
        }
    }

    #[tokio::test]
    async fn reconnect_relistens_every_tracked_channel() {
        let transport = Arc::new(InMemoryTransport::new());
        let connection = Arc::new(ConnectionLifecycle::new(transport.clone()));
        connection
            .connect(&["Event".to_string()])
            .await
            .unwrap();

        // Simulate the transport dropping its LISTENs across a reconnect.
        transport.unlisten_all().await.unwrap();

        let watcher = spawn_lifecycle_watcher(
            connection.clone(),
            transport.lifecycle_events(),
            Arc::new(Mutex::new(SubscriptionTable::new())),
            Arc::new(Mutex::new(Vec::new())),
        );

        transport.emit_lifecycle(LifecycleEvent::Connected);
        tokio::task::yield_now().await;
        while !transport.listened_channels().await.contains("Event") {
            tokio::task::yield_now().await;
        }

        assert_eq!(connection.state(), ConnectionState::Connected);
        watcher.abort();
    }

    #[tokio::test]
    async fn terminal_error_fans_out_to_listeners_and_fails_queues() {
        let transport = Arc::new(InMemoryTransport::new());
        let connection = Arc::new(ConnectionLifecycle::new(transport.clone()));
        connection.connect(&[]).await.unwrap();

        let (deliveries_tx, mut deliveries_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(SubscriptionTable::new()));
        subscriptions.lock().await.add(
            "Event",
            Arc::new(RecordingListener {
                deliveries: deliveries_tx,
            }),
        );

        let queue = Arc::new(NotificationQueue::new(
            ["Event".to_string()].into_iter().collect(),
        ));
        let queues = Arc::new(Mutex::new(vec![Arc::downgrade(&queue)]));

        let watcher = spawn_lifecycle_watcher(
            connection.clone(),
            transport.lifecycle_events(),
            subscriptions,
            queues,
        );

        transport.emit_lifecycle(LifecycleEvent::Error(TransportError::Fatal(
            "retry budget exhausted".into(),
        )));
        watcher.await.unwrap();

        match deliveries_rx.recv().await.unwrap() {
            Delivery::Fault(fault) => {
                assert_eq!(fault, TransportError::Fatal("retry budget exhausted".into()))
            }
            Delivery::Message(payload) => panic!("expected a fault, got {payload}"),
        }
        assert_eq!(connection.state(), ConnectionState::Failed);
        assert!(queue.next().await.is_err());
    }
}
