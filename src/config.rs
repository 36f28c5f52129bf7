//! Construction-time configuration for the bridge.

use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Transform applied to every delivered payload before it reaches callbacks
/// and pull queues. Identity by default. Transport faults bypass it.
pub type MessageTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Retry tuning handed verbatim to the transport implementation; the bridge
/// itself never retries.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Delay between background reconnection attempts.
    pub interval: Duration,
    /// Maximum number of attempts; `None` means unlimited.
    pub limit: Option<u32>,
    /// Overall budget after which the transport reports a terminal error;
    /// `None` means it retries forever.
    pub timeout: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            limit: None,
            timeout: None,
        }
    }
}

/// Options accepted when constructing a [`crate::NotifyBridge`].
#[derive(Clone)]
pub struct BridgeConfig {
    /// Opaque connection string, consumed by the transport implementation.
    pub conninfo: String,
    /// Channels placed under LISTEN at connect time, before any subscribe
    /// call. The implicit `error` channel is always added to this set.
    pub topics: Vec<String>,
    pub retry: RetrySettings,
    pub transform: MessageTransform,
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            conninfo: String::new(),
            topics: Vec::new(),
            retry: RetrySettings::default(),
            transform: Arc::new(|payload| payload),
        }
    }
}

impl Debug for BridgeConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("conninfo", &self.conninfo)
            .field("topics", &self.topics)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct BridgeConfigBuilder {
    conninfo: String,
    topics: Vec<String>,
    retry: Option<RetrySettings>,
    transform: Option<MessageTransform>,
}

impl BridgeConfigBuilder {
    pub fn conninfo(mut self, conninfo: impl Into<String>) -> Self {
        self.conninfo = conninfo.into();
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn transform(
        mut self,
        transform: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn build(self) -> BridgeConfig {
        BridgeConfig {
            conninfo: self.conninfo,
            topics: self.topics,
            retry: self.retry.unwrap_or_default(),
            transform: self.transform.unwrap_or_else(|| Arc::new(|payload| payload)),
        }
    }
}
