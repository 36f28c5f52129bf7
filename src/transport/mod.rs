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

//! Notification-transport boundary.
//!
//! The bridge never talks to a database driver directly. It is written
//! against [`NotifyTransport`], an object-safe seam that any LISTEN/NOTIFY
//! style service can implement: listen and unlisten by channel name, send a
//! payload to a channel, and expose two broadcast event streams: one for
//! connection lifecycle, one for delivered notifications.
//!
//! Broadcast streams are deliberate: the subscription table and any number
//! of live pull queues are independent consumers of the same notification
//! stream, and a single incoming notification may satisfy a callback and be
//! buffered into several queues at once.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

mod memory;
pub use memory::{ConnectBehavior, InMemoryTransport};

/// A single delivered notification: the channel it arrived on and its
/// JSON payload.
#[derive(Debug, Clone)]
pub struct Notification {
    pub channel: String,
    pub payload: Value,
}

/// Connection-lifecycle events emitted by the transport.
///
/// `Connected` fires on every (re)establishment, including the silent
/// background retry after a refused first attempt. `Error` is terminal:
/// the transport's retry budget is exhausted.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Connected,
    Reconnect,
    Error(TransportError),
}

/// Contract the external notification service must satisfy.
///
/// `connect` has one documented quirk the bridge is built around: the very
/// first attempt may reject with [`TransportError::ConnectionRefused`] while
/// the transport silently keeps retrying in the background, later emitting
/// [`LifecycleEvent::Connected`] on success or [`LifecycleEvent::Error`] on
/// terminal failure. Implementations must preserve that shape; the connect
/// race in [`crate::connection`] depends on it.
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    /// Begin listening on `channel`. Repeated LISTEN for a channel already
    /// under LISTEN is a no-op.
    async fn listen_to(&self, channel: &str) -> Result<(), TransportError>;

    async fn unlisten(&self, channel: &str) -> Result<(), TransportError>;

    async fn unlisten_all(&self) -> Result<(), TransportError>;

    /// Send `payload` on `channel`. Resolves on transport acknowledgment,
    /// not on delivery to any listener.
    async fn notify(&self, channel: &str, payload: Value) -> Result<(), TransportError>;

    /// A fresh receiver on the lifecycle event stream. Must be taken
    /// *before* `connect` to observe the events `connect` may produce.
    fn lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent>;

    /// A fresh receiver on the notification stream.
    fn notifications(&self) -> broadcast::Receiver<Notification>;
}
