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

//! # notify-bridge
//!
//! `notify-bridge` adapts a push-based, callback-driven notification channel
//! (a transactional database's LISTEN/NOTIFY mechanism) to two consumption
//! styles: fire-and-forget callback subscription and pull-based asynchronous
//! iteration. It also owns the connection lifecycle, including the
//! connect/retry race a transport's background reconnection introduces.
//!
//! The public surface is centered on [`NotifyBridge`], constructed over any
//! [`transport::NotifyTransport`] implementation.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use notify_bridge::transport::{ConnectBehavior, InMemoryTransport};
//! use notify_bridge::{BridgeConfig, NotifyBridge};
//! use serde_json::json;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = BridgeConfig::builder()
//!     .conninfo("postgres://localhost/app")
//!     .topic("Event")
//!     .build();
//! // The transport consumes the connection string and retry tuning; the
//! // bridge keeps the topic list and message transform.
//! let transport = Arc::new(InMemoryTransport::from_config(
//!     &config,
//!     ConnectBehavior::Immediate,
//! ));
//! let bridge = NotifyBridge::new(transport, config);
//!
//! bridge.connect().await.unwrap();
//!
//! let stream = bridge.async_iterator_promised(["Event"]).await.unwrap();
//! bridge.publish("Event", json!({ "id": 1 })).await.unwrap();
//! assert_eq!(stream.next().await.unwrap(), Some(json!({ "id": 1 })));
//!
//! stream.close().await;
//! assert_eq!(stream.next().await.unwrap(), None);
//! bridge.close().await.unwrap();
//! # });
//! ```
//!
//! ## Guarantees and limits
//!
//! For a single topic, notifications reach all registered consumers in the
//! order the transport delivered them; no ordering is guaranteed across
//! distinct topics. Within one pull handle, push/pull FIFO ordering holds
//! with no duplication or loss. There is no durability across connection
//! loss and no exactly-once delivery.
//!
//! ## Internal architecture map
//!
//! - `bridge`: the public facade composing the layers below
//! - `connection`: transport ownership, connect/retry race, re-LISTEN after
//!   reconnect
//! - `queue`: push→pull conversion behind [`TopicStream`]
//! - `subscription`: handle bookkeeping and the callback seam
//! - `transport`: the external notification-service boundary
//!
//! ## Observability model
//!
//! The crate uses `tracing` for logs/events. Library code emits events and
//! does not initialize a global subscriber; binaries and tests own one-time
//! `tracing_subscriber` initialization at process boundaries.

mod bridge;
pub use bridge::NotifyBridge;

mod config;
pub use config::{BridgeConfig, BridgeConfigBuilder, MessageTransform, RetrySettings};

mod connection;
pub use connection::ConnectionState;

mod error;
pub use error::{BridgeError, TransportError};

mod observability;

mod queue;
pub use queue::TopicStream;

mod subscription;
pub use subscription::{Delivery, MessageListener, SubscriptionHandle};

pub mod transport;
