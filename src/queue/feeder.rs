//! Spawned task bridging the transport's notification broadcast into a queue.

use crate::config::MessageTransform;
use crate::observability::{components, events};
use crate::queue::notification_queue::NotificationQueue;
use crate::transport::Notification;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Forwards matching notifications into `queue` until the queue closes or
/// the notification stream ends. The message transform is applied here, so
/// the queue itself stays transport- and schema-agnostic.
pub(crate) fn spawn_queue_feeder(
    queue: Arc<NotificationQueue>,
    mut notifications: broadcast::Receiver<Notification>,
    transform: MessageTransform,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    if !queue.is_open().await {
                        break;
                    }
                    if !queue.wants(&notification.channel) {
                        continue;
                    }
                    trace!(
                        component = components::QUEUE_FEEDER,
                        channel = %notification.channel,
                        "forwarding notification into queue"
                    );
                    queue.push((transform)(notification.payload)).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        event = events::NOTIFICATION_LAGGED,
                        component = components::QUEUE_FEEDER,
                        skipped,
                        "notification stream lagged; continuing from the current position"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
