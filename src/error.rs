//! Error taxonomy for the notification bridge.

use thiserror::Error;

/// Faults reported at the transport boundary.
///
/// `ConnectionRefused` is the one transient class: the transport keeps
/// retrying in the background after reporting it, so the connect race
/// swallows it rather than surfacing it. Everything else is terminal for
/// the operation that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("LISTEN failed for channel `{channel}`: {reason}")]
    Listen { channel: String, reason: String },

    #[error("UNLISTEN failed for channel `{channel}`: {reason}")]
    Unlisten { channel: String, reason: String },

    #[error("NOTIFY failed for channel `{channel}`: {reason}")]
    Notify { channel: String, reason: String },

    #[error("transport failure: {0}")]
    Fatal(String),
}

impl TransportError {
    /// Whether this failure belongs to the transient connection-refused
    /// class that the background retry is expected to resolve.
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, TransportError::ConnectionRefused(_))
    }
}

/// Errors surfaced through the bridge's public operations.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Publish attempted before a successful connect. Recovered by the
    /// caller; never retried internally.
    #[error("attempted to publish a `{topic}` event via the bridge, but it is not yet connected")]
    NotConnected { topic: String },

    /// Non-transient connect failure, or a terminal error event after a
    /// successful connect. The bridge instance is unusable afterwards.
    #[error("connection failed fatally: {0}")]
    ConnectionFatal(TransportError),

    /// Unsubscribe with a handle that is absent from the table.
    #[error("no subscription registered under handle {0}")]
    SubscriptionNotFound(u64),

    /// Transport round-trip failure on publish, subscribe, or unsubscribe.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
