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

//! Connection layer.
//!
//! Owns the transport handle and the connect/retry race: a refused first
//! attempt is treated as potentially transient and deferred to the
//! transport's background retry, while any other rejection is fatal
//! immediately. The race settles exactly once per `connect` call; later
//! reconnects are handled by the lifecycle watcher's re-LISTEN step without
//! re-running it.

pub(crate) mod lifecycle;
pub(crate) mod watcher;

pub use lifecycle::ConnectionState;
