//! Recording acknowledgment sink.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex`; the lock only guards in-memory vectors and is
//! never held across `.await`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use upgrade_coordinator::{AckSink, ActionId, UpgradeError, UpgradeRequest, UpgradeResult};

/// One call observed by the sink, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// `ack` was called for this action (whether or not it failed)
    Ack(ActionId),
    /// `commit` was called
    Commit,
}

#[derive(Debug, Default)]
struct SinkState {
    events: Vec<SinkEvent>,
    failing_acks: HashSet<ActionId>,
    fail_commit: bool,
}

/// [`AckSink`] that records every call and can inject failures.
#[derive(Debug, Default)]
pub struct RecordingAckSink {
    state: Mutex<SinkState>,
    ack_delay: Duration,
}

impl RecordingAckSink {
    /// Sink where every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose `ack` sleeps for `delay` before recording, like a slow
    /// network transport.
    pub fn with_ack_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::default(),
            ack_delay: delay,
        }
    }

    /// Make `ack` fail for `action_id`. The call is still recorded.
    pub fn fail_ack_for(&self, action_id: impl Into<ActionId>) {
        self.state.lock().failing_acks.insert(action_id.into());
    }

    /// Make every `commit` fail. The call is still recorded.
    pub fn fail_commits(&self) {
        self.state.lock().fail_commit = true;
    }

    /// All calls in order.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.state.lock().events.clone()
    }

    /// Action ids passed to `ack`, in call order.
    pub fn acked(&self) -> Vec<ActionId> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Ack(id) => Some(id.clone()),
                SinkEvent::Commit => None,
            })
            .collect()
    }

    /// Number of `ack` calls.
    pub fn ack_count(&self) -> usize {
        self.acked().len()
    }

    /// Number of `commit` calls.
    pub fn commit_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, SinkEvent::Commit))
            .count()
    }
}

#[async_trait]
impl AckSink for RecordingAckSink {
    async fn ack(&self, _token: &CancellationToken, request: &UpgradeRequest) -> UpgradeResult<()> {
        if !self.ack_delay.is_zero() {
            tokio::time::sleep(self.ack_delay).await;
        }
        let mut state = self.state.lock();
        state.events.push(SinkEvent::Ack(request.action_id().clone()));
        if state.failing_acks.contains(request.action_id()) {
            return Err(UpgradeError::ack(format!(
                "injected failure for {}",
                request.action_id()
            )));
        }
        Ok(())
    }

    async fn commit(&self, _token: &CancellationToken) -> UpgradeResult<()> {
        let mut state = self.state.lock();
        state.events.push(SinkEvent::Commit);
        if state.fail_commit {
            return Err(UpgradeError::commit("injected failure"));
        }
        Ok(())
    }
}
