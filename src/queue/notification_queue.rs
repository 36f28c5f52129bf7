//! Two-queue push→pull state machine.

use crate::error::BridgeError;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tokio::sync::oneshot;
use tokio::sync::Mutex;

/// Converts arbitrarily-timed pushed values into a sequence consumers pull
/// from at their own pace.
///
/// Two FIFO queues, never both non-empty: `waiters` holds pull requests that
/// arrived before a value, `buffered` holds values that arrived before a
/// pull. Producers never block; the buffer is unbounded.
pub(crate) struct NotificationQueue {
    channels: HashSet<String>,
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    waiters: VecDeque<oneshot::Sender<Option<Value>>>,
    buffered: VecDeque<Value>,
    phase: Phase,
}

enum Phase {
    Open,
    Closed,
    Failed(BridgeError),
}

impl NotificationQueue {
    /// The channel set is fixed at construction; the queue forwards every
    /// notification received for any of these names.
    pub(crate) fn new(channels: HashSet<String>) -> Self {
        Self {
            channels,
            inner: Mutex::new(QueueInner {
                waiters: VecDeque::new(),
                buffered: VecDeque::new(),
                phase: Phase::Open,
            }),
        }
    }

    pub(crate) fn wants(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    pub(crate) async fn is_open(&self) -> bool {
        matches!(self.inner.lock().await.phase, Phase::Open)
    }

    /// Resolve the earliest waiter with `value`, or buffer it if no pull is
    /// pending. No-op once the queue is closed or failed.
    pub(crate) async fn push(&self, value: Value) {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.phase, Phase::Open) {
            return;
        }

        let mut value = value;
        while let Some(waiter) = inner.waiters.pop_front() {
            // The receiving pull may have been dropped before resolution;
            // reclaim the value and hand it to the next waiter instead of
            // losing it.
            if let Err(Some(reclaimed)) = waiter.send(Some(value)) {
                value = reclaimed;
                continue;
            }
            return;
        }
        inner.buffered.push_back(value);
    }

    /// Pull the next value. Returns a buffered value immediately, otherwise
    /// waits in FIFO position until a value is pushed or the queue closes.
    /// On a closed queue resolves `None` at once; pulls issued after `fail`
    /// resolve with the stored error.
    pub(crate) async fn next(&self) -> Result<Option<Value>, BridgeError> {
        let receiver = {
            let mut inner = self.inner.lock().await;
            match &inner.phase {
                Phase::Closed => return Ok(None),
                Phase::Failed(error) => return Err(error.clone()),
                Phase::Open => {}
            }
            if let Some(value) = inner.buffered.pop_front() {
                return Ok(Some(value));
            }
            let (resolve, receiver) = oneshot::channel();
            inner.waiters.push_back(resolve);
            receiver
        };

        match receiver.await {
            Ok(outcome) => Ok(outcome),
            // Waiter sender dropped unresolved; only reachable if the queue
            // itself was dropped, so answer terminally.
            Err(_) => Ok(None),
        }
    }

    /// Idempotent: the first call resolves every pending pull terminally and
    /// discards buffered values; later calls are no-ops.
    pub(crate) async fn close(&self) {
        self.terminate(Phase::Closed).await;
    }

    /// As `close`, but pulls issued afterwards resolve with `error`.
    /// Already-pending pulls are still resolved terminally, not rejected.
    pub(crate) async fn fail(&self, error: BridgeError) {
        self.terminate(Phase::Failed(error)).await;
    }

    async fn terminate(&self, phase: Phase) {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.phase, Phase::Open) {
            return;
        }
        inner.phase = phase;
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(None);
        }
        inner.buffered.clear();
    }

    #[cfg(test)]
    pub(crate) async fn depths(&self) -> (usize, usize) {
        let inner = self.inner.lock().await;
        (inner.waiters.len(), inner.buffered.len())
    }
}
