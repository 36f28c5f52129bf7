//! Connection state machine and the connect/retry race.

use crate::error::{BridgeError, TransportError};
use crate::observability::{components, events};
use crate::transport::{LifecycleEvent, NotifyTransport};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Externally observable connection state.
///
/// `connect` drives `Disconnected → Connecting` and settles on exactly one
/// of `Connected` or `Failed`. A transport-level background reconnect after
/// `Connected` re-runs the LISTEN step but does not change this state unless
/// it errors terminally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Exclusive owner of the transport handle. Resolves the connect race and
/// keeps the set of channels under active LISTEN so they can be
/// re-established after a reconnect.
pub(crate) struct ConnectionLifecycle {
    transport: Arc<dyn NotifyTransport>,
    state: ArcSwap<ConnectionState>,
    listened: Mutex<HashSet<String>>,
    fault: Mutex<Option<TransportError>>,
}

impl ConnectionLifecycle {
    pub(crate) fn new(transport: Arc<dyn NotifyTransport>) -> Self {
        Self {
            transport,
            state: ArcSwap::from_pointee(ConnectionState::Disconnected),
            listened: Mutex::new(HashSet::new()),
            fault: Mutex::new(None),
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn NotifyTransport> {
        &self.transport
    }

    pub(crate) fn state(&self) -> ConnectionState {
        **self.state.load()
    }

    pub(crate) fn mark_failed(&self) {
        self.state.store(Arc::new(ConnectionState::Failed));
    }

    /// Mark the lifecycle failed and remember the fault, so consumers that
    /// appear after the failure can still observe it.
    pub(crate) async fn record_fault(&self, fault: TransportError) {
        *self.fault.lock().await = Some(fault);
        self.mark_failed();
    }

    pub(crate) async fn terminal_fault(&self) -> Option<TransportError> {
        self.fault.lock().await.clone()
    }

    /// Resolve the connect race, exactly once per call.
    ///
    /// The transport's first `connect` attempt may reject with a transient
    /// connection-refused error while its background retry proceeds, so that
    /// rejection is swallowed; any other rejection is fatal immediately. The
    /// first decisive lifecycle event then determines the outcome: on
    /// `Connected` every channel in `channels` is placed under LISTEN (all
    /// must succeed), on `Error` the received fault propagates. The
    /// lifecycle receiver is taken before the attempt so no event can be
    /// missed.
    pub(crate) async fn connect(&self, channels: &[String]) -> Result<(), BridgeError> {
        self.state.store(Arc::new(ConnectionState::Connecting));

        let mut lifecycle = self.transport.lifecycle_events();

        if let Err(error) = self.transport.connect().await {
            if error.is_connection_refused() {
                debug!(
                    event = events::CONNECT_REFUSED_DEFERRED,
                    component = components::CONNECTION,
                    %error,
                    "first attempt refused; deferring to the background retry"
                );
            } else {
                self.record_fault(error.clone()).await;
                return Err(BridgeError::ConnectionFatal(error));
            }
        }

        loop {
            match lifecycle.recv().await {
                Ok(LifecycleEvent::Connected) => {
                    for channel in channels {
                        if let Err(error) = self.listen(channel).await {
                            self.mark_failed();
                            return Err(error);
                        }
                    }
                    self.state.store(Arc::new(ConnectionState::Connected));
                    debug!(
                        event = events::CONNECT_RACE_DECIDED,
                        component = components::CONNECTION,
                        outcome = "connected",
                        channels = channels.len(),
                        "connected and listening"
                    );
                    return Ok(());
                }
                Ok(LifecycleEvent::Error(error)) => {
                    self.record_fault(error.clone()).await;
                    debug!(
                        event = events::CONNECT_RACE_DECIDED,
                        component = components::CONNECTION,
                        outcome = "failed",
                        %error,
                        "transport reported a terminal error before connecting"
                    );
                    return Err(BridgeError::ConnectionFatal(error));
                }
                Ok(LifecycleEvent::Reconnect) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        component = components::CONNECTION,
                        skipped, "lifecycle event stream lagged during connect"
                    );
                }
                Err(RecvError::Closed) => {
                    let fault = TransportError::Fatal(
                        "lifecycle event stream closed before the connection was established"
                            .to_string(),
                    );
                    self.record_fault(fault.clone()).await;
                    return Err(BridgeError::ConnectionFatal(fault));
                }
            }
        }
    }

    /// Idempotent: a channel already under LISTEN is left alone.
    pub(crate) async fn listen(&self, channel: &str) -> Result<(), BridgeError> {
        let mut listened = self.listened.lock().await;
        if listened.contains(channel) {
            return Ok(());
        }
        self.transport.listen_to(channel).await?;
        listened.insert(channel.to_string());
        Ok(())
    }

    pub(crate) async fn unlisten(&self, channel: &str) -> Result<(), BridgeError> {
        self.transport.unlisten(channel).await?;
        self.listened.lock().await.remove(channel);
        Ok(())
    }

    /// Re-issue LISTEN for every tracked channel after a transport-level
    /// reconnect. The tracked set is unchanged.
    pub(crate) async fn relisten_all(&self) -> Result<(), TransportError> {
        let listened = self.listened.lock().await;
        for channel in listened.iter() {
            self.transport.listen_to(channel).await?;
        }
        Ok(())
    }

    pub(crate) async fn shutdown(&self) -> Result<(), BridgeError> {
        self.transport.unlisten_all().await?;
        self.listened.lock().await.clear();
        self.transport.close().await?;
        self.state.store(Arc::new(ConnectionState::Disconnected));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn listened_channels(&self) -> HashSet<String> {
        self.listened.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionLifecycle, ConnectionState};
    use crate::error::{BridgeError, TransportError};
    use crate::transport::{
        ConnectBehavior, InMemoryTransport, LifecycleEvent, Notification, NotifyTransport,
    };
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn channels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn immediate_connect_listens_all_channels_and_ends_connected() {
        let transport = Arc::new(InMemoryTransport::new());
        let connection = ConnectionLifecycle::new(transport.clone());

        connection
            .connect(&channels(&["Event", "error"]))
            .await
            .unwrap();

        assert_eq!(connection.state(), ConnectionState::Connected);
        let listened = transport.listened_channels().await;
        assert!(listened.contains("Event"));
        assert!(listened.contains("error"));
    }

    #[tokio::test]
    async fn refused_first_attempt_is_deferred_to_the_background_retry() {
        let transport = Arc::new(InMemoryTransport::with_behavior(
            ConnectBehavior::RefusedThenRecovered,
        ));
        let connection = ConnectionLifecycle::new(transport.clone());

        connection.connect(&channels(&["Event"])).await.unwrap();

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(transport.listened_channels().await.contains("Event"));
    }

    #[tokio::test]
    async fn non_refused_rejection_is_fatal_and_bypasses_the_race() {
        let transport = Arc::new(InMemoryTransport::with_behavior(
            ConnectBehavior::FatalRejection(TransportError::Fatal("bad credentials".into())),
        ));
        let connection = ConnectionLifecycle::new(transport);

        match connection.connect(&channels(&["Event"])).await {
            Err(BridgeError::ConnectionFatal(error)) => {
                assert_eq!(error, TransportError::Fatal("bad credentials".into()))
            }
            other => panic!("expected ConnectionFatal, got {other:?}"),
        }
        assert_eq!(connection.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn error_event_before_connected_rejects_the_connect_call() {
        let transport = Arc::new(InMemoryTransport::with_behavior(
            ConnectBehavior::ErrorEvent(TransportError::Fatal("retry budget exhausted".into())),
        ));
        let connection = ConnectionLifecycle::new(transport);

        assert!(connection.connect(&channels(&["Event"])).await.is_err());
        assert_eq!(connection.state(), ConnectionState::Failed);
    }

    struct ListenRefusingTransport {
        lifecycle_tx: broadcast::Sender<LifecycleEvent>,
        notification_tx: broadcast::Sender<Notification>,
    }

    impl ListenRefusingTransport {
        fn new() -> Self {
            let (lifecycle_tx, _) = broadcast::channel(8);
            let (notification_tx, _) = broadcast::channel(8);
            Self {
                lifecycle_tx,
                notification_tx,
            }
        }
    }

    #[async_trait]
    impl NotifyTransport for ListenRefusingTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let _ = self.lifecycle_tx.send(LifecycleEvent::Connected);
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn listen_to(&self, channel: &str) -> Result<(), TransportError> {
            Err(TransportError::Listen {
                channel: channel.to_string(),
                reason: "connection lost".to_string(),
            })
        }

        async fn unlisten(&self, _channel: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn unlisten_all(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn notify(&self, _channel: &str, _payload: Value) -> Result<(), TransportError> {
            Ok(())
        }

        fn lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent> {
            self.lifecycle_tx.subscribe()
        }

        fn notifications(&self) -> broadcast::Receiver<Notification> {
            self.notification_tx.subscribe()
        }
    }

    #[tokio::test]
    async fn any_listen_failure_fails_the_whole_connect() {
        let connection = ConnectionLifecycle::new(Arc::new(ListenRefusingTransport::new()));

        match connection.connect(&channels(&["Event"])).await {
            Err(BridgeError::Transport(TransportError::Listen { channel, .. })) => {
                assert_eq!(channel, "Event")
            }
            other => panic!("expected a Listen failure, got {other:?}"),
        }
        assert_eq!(connection.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn listen_is_idempotent_per_channel() {
        let transport = Arc::new(InMemoryTransport::new());
        let connection = ConnectionLifecycle::new(transport.clone());

        connection.listen("Event").await.unwrap();
        connection.listen("Event").await.unwrap();

        assert_eq!(connection.listened_channels().await.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_clears_listens_and_returns_to_disconnected() {
        let transport = Arc::new(InMemoryTransport::new());
        let connection = ConnectionLifecycle::new(transport.clone());

        connection.connect(&channels(&["Event"])).await.unwrap();
        connection.shutdown().await.unwrap();

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(transport.listened_channels().await.is_empty());
        assert!(connection.listened_channels().await.is_empty());
    }
}
