/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Push→pull queue layer.
//!
//! Owns the conversion from callback-delivered notifications to pull-based
//! iteration: an explicit two-queue state machine (pending pulls vs. buffered
//! values) fed by a spawned forwarding task, surfaced to consumers as
//! [`TopicStream`].

pub(crate) mod feeder;
pub(crate) mod notification_queue;

use crate::config::MessageTransform;
use crate::error::BridgeError;
use crate::queue::notification_queue::NotificationQueue;
use crate::transport::Notification;
use futures::Stream;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Pull handle over the notifications of a set of channels.
///
/// Obtained from [`crate::NotifyBridge::async_iterator`] or
/// [`crate::NotifyBridge::async_iterator_promised`]. Closing the handle is
/// the cancellation mechanism: pending pulls resolve terminally and buffered
/// values are discarded. Closing does **not** unlisten the channels at the
/// transport; the handle owns only its own buffer.
pub struct TopicStream {
    queue: Arc<NotificationQueue>,
    feeder: JoinHandle<()>,
}

impl TopicStream {
    pub(crate) fn open(
        channels: HashSet<String>,
        notifications: broadcast::Receiver<Notification>,
        transform: MessageTransform,
    ) -> Self {
        let queue = Arc::new(NotificationQueue::new(channels));
        let feeder = feeder::spawn_queue_feeder(queue.clone(), notifications, transform);
        Self { queue, feeder }
    }

    pub(crate) fn queue(&self) -> Arc<NotificationQueue> {
        self.queue.clone()
    }

    /// Pull the next value: a buffered value immediately, otherwise waits in
    /// FIFO position. `Ok(None)` is the terminal result of a closed stream.
    /// Pulls issued after the stream has failed return the failure.
    pub async fn next(&self) -> Result<Option<Value>, BridgeError> {
        self.queue.next().await
    }

    /// Idempotent cancellation: resolves all pending pulls terminally,
    /// discards buffered values, and stops the feeder task.
    pub async fn close(&self) {
        self.queue.close().await;
        self.feeder.abort();
    }

    /// The same pull contract as a [`futures::Stream`]. The stream ends on
    /// the terminal result; a failure is yielded once and then ends it.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value, BridgeError>> {
        futures::stream::unfold(Some(self), |state| async move {
            let handle = state?;
            match handle.next().await {
                Ok(Some(value)) => Some((Ok(value), Some(handle))),
                Ok(None) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
    }
}

impl Drop for TopicStream {
    fn drop(&mut self) {
        self.feeder.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::TopicStream;
    use crate::transport::Notification;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn stream_for(channels: &[&str]) -> (broadcast::Sender<Notification>, TopicStream) {
        let (sender, receiver) = broadcast::channel(16);
        let stream = TopicStream::open(
            channels.iter().map(|c| c.to_string()).collect(),
            receiver,
            Arc::new(|payload| payload),
        );
        (sender, stream)
    }

    #[tokio::test]
    async fn next_yields_pushed_values_then_terminal_after_close() {
        let (sender, stream) = stream_for(&["events"]);

        sender
            .send(Notification {
                channel: "events".into(),
                payload: json!({ "id": 1 }),
            })
            .unwrap();

        assert_eq!(stream.next().await.unwrap(), Some(json!({ "id": 1 })));

        stream.close().await;
        assert_eq!(stream.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn into_stream_ends_on_close() {
        let (sender, stream) = stream_for(&["events"]);

        sender
            .send(Notification {
                channel: "events".into(),
                payload: json!("only"),
            })
            .unwrap();

        // Give the feeder a chance to buffer the value before closing.
        let first = stream.next().await.unwrap();
        assert_eq!(first, Some(json!("only")));

        stream.close().await;
        let collected: Vec<_> = stream.into_stream().collect().await;
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn two_streams_on_one_channel_both_receive_every_value() {
        let (sender, receiver_a) = broadcast::channel(16);
        let receiver_b = sender.subscribe();

        let stream_a = TopicStream::open(
            ["events".to_string()].into_iter().collect(),
            receiver_a,
            Arc::new(|payload| payload),
        );
        let stream_b = TopicStream::open(
            ["events".to_string()].into_iter().collect(),
            receiver_b,
            Arc::new(|payload| payload),
        );

        for i in 0..3 {
            sender
                .send(Notification {
                    channel: "events".into(),
                    payload: json!(i),
                })
                .unwrap();
        }

        for i in 0..3 {
            assert_eq!(stream_a.next().await.unwrap(), Some(json!(i)));
            assert_eq!(stream_b.next().await.unwrap(), Some(json!(i)));
        }
    }
}
