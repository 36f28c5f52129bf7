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

use crate::config::{BridgeConfig, MessageTransform};
use crate::connection::lifecycle::{ConnectionLifecycle, ConnectionState};
use crate::connection::watcher::{spawn_lifecycle_watcher, QueueRegistry};
use crate::error::{BridgeError, TransportError};
use crate::observability::{components, events};
use crate::queue::TopicStream;
use crate::subscription::listener::{Delivery, MessageListener};
use crate::subscription::table::{SubscriptionHandle, SubscriptionTable};
use crate::transport::{LifecycleEvent, Notification, NotifyTransport};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// The implicit channel carrying database-side errors, always joined to the
/// configured topic list at connect time.
const ERROR_CHANNEL: &str = "error";

/// Bridges a push-based notification transport to two consumption styles:
/// fire-and-forget callback subscriptions and pull-based async iteration.
///
/// Standalone by design: no pub/sub base type is inherited; the minimal
/// publish/subscribe/unsubscribe/iterate capability set is implemented
/// directly. Construct one explicitly and pass it to every consumer.
pub struct NotifyBridge {
    config: BridgeConfig,
    connection: Arc<ConnectionLifecycle>,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    queues: QueueRegistry,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NotifyBridge {
    pub fn new(transport: Arc<dyn NotifyTransport>, config: BridgeConfig) -> Self {
        Self {
            config,
            connection: Arc::new(ConnectionLifecycle::new(transport)),
            subscriptions: Arc::new(Mutex::new(SubscriptionTable::new())),
            queues: Arc::new(Mutex::new(Vec::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Resolve the connect race and place every configured topic (plus the
    /// implicit `error` channel) under LISTEN.
    ///
    /// Rejects when any of the following occur:
    ///   1. the transport's initial `connect` fails for a non-transient
    ///      (i.e. non-connection-refused) reason,
    ///   2. the transport emits a terminal `error` event, indicating the
    ///      connection failed even after repeated attempts,
    ///   3. the connection succeeded but at least one LISTEN failed.
    ///
    /// Resolves otherwise, once all requested channels are being listened
    /// to. On success the dispatch and lifecycle-watcher tasks are running;
    /// a later transport-level reconnect re-establishes LISTEN without
    /// re-running the race.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        // The tasks lock serializes concurrent connect calls; holding it for
        // the whole resolution also guarantees the dispatch and watcher
        // tasks are spawned at most once per established connection, so a
        // repeated connect cannot duplicate deliveries.
        let mut tasks = self.tasks.lock().await;
        if self.connection.state() == ConnectionState::Connected {
            return Ok(());
        }

        // Receivers are taken before the connect attempt so events emitted
        // while it settles are buffered, not missed.
        let dispatch_rx = self.connection.transport().notifications();
        let watcher_rx = self.connection.transport().lifecycle_events();

        let mut channels: Vec<String> = self.config.topics.clone();
        channels.push(ERROR_CHANNEL.to_string());

        self.connection.connect(&channels).await?;

        tasks.push(spawn_dispatch(
            dispatch_rx,
            self.subscriptions.clone(),
            self.config.transform.clone(),
        ));
        // The watcher may replay the initial `Connected`; re-LISTEN is
        // idempotent at the transport, so that is harmless.
        tasks.push(spawn_lifecycle_watcher(
            self.connection.clone(),
            watcher_rx,
            self.subscriptions.clone(),
            self.queues.clone(),
        ));

        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// A fresh receiver on the transport's lifecycle stream, for embedding
    /// applications that attach their own connected/reconnect/error policy.
    /// The bridge itself never terminates the process on a fatal error.
    pub fn lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.connection.transport().lifecycle_events()
    }

    /// Send `payload` on `topic`. Resolves on transport acknowledgment, not
    /// on delivery to any subscriber.
    pub async fn publish(&self, topic: &str, payload: Value) -> Result<(), BridgeError> {
        if self.connection.state() != ConnectionState::Connected {
            return Err(BridgeError::NotConnected {
                topic: topic.to_string(),
            });
        }
        self.connection.transport().notify(topic, payload).await?;
        Ok(())
    }

    /// Ensure `topic` is under LISTEN and register `listener` for it.
    /// Deliveries carry the message transform applied; transport faults pass
    /// through untransformed as [`Delivery::Fault`].
    pub async fn subscribe(
        &self,
        topic: &str,
        listener: Arc<dyn MessageListener>,
    ) -> Result<SubscriptionHandle, BridgeError> {
        self.connection.listen(topic).await?;
        let handle = self.subscriptions.lock().await.add(topic, listener);
        debug!(
            component = components::BRIDGE,
            topic, handle, "subscription registered"
        );
        Ok(handle)
    }

    /// Remove the subscription behind `handle` and UNLISTEN its topic.
    ///
    /// Known limitation, preserved as documented behavior: there is no
    /// per-topic reference count, so unsubscribing one of several
    /// subscriptions on the same topic unlistens the topic for all of them.
    /// Repairing this would mean refcounting topics in the subscription
    /// table.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), BridgeError> {
        if self.connection.state() != ConnectionState::Connected {
            warn!(
                component = components::BRIDGE,
                handle, "unsubscribing, but the bridge is not connected"
            );
        }
        let (channel, _listener) = self.subscriptions.lock().await.remove(handle)?;
        self.connection.unlisten(&channel).await?;
        Ok(())
    }

    /// Pull-based iteration over `topics`, assuming they are already under
    /// LISTEN (via the configured topic list or prior subscribe calls).
    pub async fn async_iterator<I, S>(&self, topics: I) -> TopicStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: HashSet<String> = topics.into_iter().map(Into::into).collect();
        let stream = TopicStream::open(
            channels,
            self.connection.transport().notifications(),
            self.config.transform.clone(),
        );

        {
            let mut queues = self.queues.lock().await;
            queues.retain(|queue| queue.strong_count() > 0);
            queues.push(Arc::downgrade(&stream.queue()));
        }

        // The lifecycle watcher only fails queues registered before a
        // terminal error; a stream opened afterwards must not hang on an
        // unusable bridge.
        if self.connection.state() == ConnectionState::Failed {
            let fault = self.connection.terminal_fault().await.unwrap_or_else(|| {
                TransportError::Fatal("connection previously failed".to_string())
            });
            stream
                .queue()
                .fail(BridgeError::ConnectionFatal(fault))
                .await;
        }

        stream
    }

    /// As [`Self::async_iterator`], but first ensures each requested topic
    /// is under LISTEN (tolerating an empty topic list). Use this variant
    /// when topics are not guaranteed to be pre-registered.
    pub async fn async_iterator_promised<I, S>(&self, topics: I) -> Result<TopicStream, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: Vec<String> = topics.into_iter().map(Into::into).collect();
        for channel in &channels {
            self.connection.listen(channel).await?;
        }
        Ok(self.async_iterator(channels).await)
    }

    /// UNLISTEN every active topic and close the transport connection.
    /// Idempotent in effect.
    pub async fn close(&self) -> Result<(), BridgeError> {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        drop(tasks);

        self.connection.shutdown().await
    }
}

/// Dispatch loop feeding callback subscriptions. For one channel, listeners
/// are invoked in registration order, in the order the transport delivered
/// the notifications.
fn spawn_dispatch(
    mut notifications: broadcast::Receiver<Notification>,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    transform: MessageTransform,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    let listeners = subscriptions
                        .lock()
                        .await
                        .listeners_for(&notification.channel);
                    if listeners.is_empty() {
                        continue;
                    }
                    let transformed = (transform)(notification.payload);
                    for (handle, listener) in listeners {
                        debug!(
                            event = events::DISPATCH_DELIVER,
                            component = components::DISPATCH,
                            channel = %notification.channel,
                            handle,
                            "delivering notification to subscription"
                        );
                        listener
                            .on_delivery(Delivery::Message(transformed.clone()))
                            .await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        event = events::NOTIFICATION_LAGGED,
                        component = components::DISPATCH,
                        skipped,
                        "notification stream lagged; continuing from the current position"
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
