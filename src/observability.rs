//! Shared string constants for structured tracing fields.
//!
//! Library code emits events/spans only; subscriber initialization belongs
//! to the embedding binary or test harness.

pub(crate) mod components {
    pub const BRIDGE: &str = "bridge";
    pub const CONNECTION: &str = "connection";
    pub const DISPATCH: &str = "dispatch";
    pub const QUEUE_FEEDER: &str = "queue_feeder";
    pub const WATCHER: &str = "lifecycle_watcher";
}

pub(crate) mod events {
    pub const CONNECT_RACE_DECIDED: &str = "connect_race_decided";
    pub const CONNECT_REFUSED_DEFERRED: &str = "connect_refused_deferred";
    pub const DISPATCH_DELIVER: &str = "dispatch_deliver";
    pub const FAULT_FANOUT: &str = "fault_fanout";
    pub const NOTIFICATION_LAGGED: &str = "notification_lagged";
    pub const RELISTEN_AFTER_RECONNECT: &str = "relisten_after_reconnect";
}
