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

//! Callback-subscription layer.
//!
//! Bookkeeping for fire-and-forget subscriptions: opaque monotone handles,
//! the channel/listener table behind them, and the listener seam callbacks
//! implement.

pub(crate) mod listener;
pub(crate) mod table;

pub use listener::{Delivery, MessageListener};
pub use table::SubscriptionHandle;
