//! Callback seam for fire-and-forget subscriptions.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;

/// What a callback subscription receives.
///
/// `Message` carries a payload with the bridge's message transform already
/// applied. `Fault` passes a transport-reported error through untransformed,
/// so consumers can distinguish transport faults from application data by
/// variant.
#[derive(Debug, Clone)]
pub enum Delivery {
    Message(Value),
    Fault(TransportError),
}

/// Listener registered through [`crate::NotifyBridge::subscribe`].
///
/// Invoked from the bridge's dispatch task; for one channel, deliveries
/// arrive in the order the transport delivered them.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_delivery(&self, delivery: Delivery);
}
