//! In-memory loopback transport for tests and examples.

use crate::config::{BridgeConfig, RetrySettings};
use crate::error::TransportError;
use crate::transport::{LifecycleEvent, Notification, NotifyTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Mutex;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Scripted outcome for [`InMemoryTransport::connect`].
#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    /// `connect` resolves and `Connected` fires immediately.
    Immediate,
    /// `connect` rejects with `ConnectionRefused`, then the background
    /// retry succeeds and `Connected` fires shortly after.
    RefusedThenRecovered,
    /// `connect` rejects with the given non-transient error.
    FatalRejection(TransportError),
    /// `connect` resolves but the transport emits a terminal `Error`
    /// event instead of `Connected`.
    ErrorEvent(TransportError),
}

/// Loopback [`NotifyTransport`]: `notify` delivers straight back to the
/// notification stream, but only for channels currently under LISTEN,
/// mirroring how a LISTEN/NOTIFY service behaves.
pub struct InMemoryTransport {
    behavior: ConnectBehavior,
    conninfo: String,
    retry: RetrySettings,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    notification_tx: broadcast::Sender<Notification>,
    listened: Mutex<HashSet<String>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_behavior(ConnectBehavior::Immediate)
    }

    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        // Standalone construction keeps the recovery delay short so tests
        // that never touch a config stay fast.
        let config = BridgeConfig {
            retry: RetrySettings {
                interval: Duration::from_millis(10),
                ..RetrySettings::default()
            },
            ..BridgeConfig::default()
        };
        Self::from_config(&config, behavior)
    }

    /// Construction seam consuming the bridge configuration: the connection
    /// string and retry tuning are taken verbatim. The retry interval is
    /// honored as the delay before the background recovery succeeds when
    /// the first attempt was refused.
    pub fn from_config(config: &BridgeConfig, behavior: ConnectBehavior) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (notification_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            behavior,
            conninfo: config.conninfo.clone(),
            retry: config.retry.clone(),
            lifecycle_tx,
            notification_tx,
            listened: Mutex::new(HashSet::new()),
        }
    }

    /// The connection string this transport was constructed with.
    pub fn conninfo(&self) -> &str {
        &self.conninfo
    }

    pub fn retry_settings(&self) -> &RetrySettings {
        &self.retry
    }

    /// Channels currently under LISTEN.
    pub async fn listened_channels(&self) -> HashSet<String> {
        self.listened.lock().await.clone()
    }

    /// Inject a lifecycle event, e.g. to simulate a background reconnect
    /// or a terminal post-connect error.
    pub fn emit_lifecycle(&self, event: LifecycleEvent) {
        // No receivers is fine; nothing is observing yet.
        let _ = self.lifecycle_tx.send(event);
    }

    /// Inject a notification without going through `notify`, bypassing the
    /// LISTEN check. Useful for driving queues directly.
    pub fn inject(&self, channel: &str, payload: Value) {
        let _ = self.notification_tx.send(Notification {
            channel: channel.to_string(),
            payload,
        });
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotifyTransport for InMemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        match &self.behavior {
            ConnectBehavior::Immediate => {
                let _ = self.lifecycle_tx.send(LifecycleEvent::Connected);
                Ok(())
            }
            ConnectBehavior::RefusedThenRecovered => {
                let lifecycle_tx = self.lifecycle_tx.clone();
                let recovery_delay = self.retry.interval;
                tokio::spawn(async move {
                    tokio::time::sleep(recovery_delay).await;
                    let _ = lifecycle_tx.send(LifecycleEvent::Connected);
                });
                Err(TransportError::ConnectionRefused(
                    "first attempt refused, retrying in the background".to_string(),
                ))
            }
            ConnectBehavior::FatalRejection(err) => Err(err.clone()),
            ConnectBehavior::ErrorEvent(err) => {
                let _ = self.lifecycle_tx.send(LifecycleEvent::Error(err.clone()));
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn listen_to(&self, channel: &str) -> Result<(), TransportError> {
        self.listened.lock().await.insert(channel.to_string());
        Ok(())
    }

    async fn unlisten(&self, channel: &str) -> Result<(), TransportError> {
        self.listened.lock().await.remove(channel);
        Ok(())
    }

    async fn unlisten_all(&self) -> Result<(), TransportError> {
        self.listened.lock().await.clear();
        Ok(())
    }

    async fn notify(&self, channel: &str, payload: Value) -> Result<(), TransportError> {
        if self.listened.lock().await.contains(channel) {
            let _ = self.notification_tx.send(Notification {
                channel: channel.to_string(),
                payload,
            });
        }
        Ok(())
    }

    fn lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle_tx.subscribe()
    }

    fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notification_tx.subscribe()
    }
}
