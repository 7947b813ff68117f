//! Scripted upgrade executor.
//!
//! Every invocation is recorded and then parked until the test resolves it
//! with [`ScriptedExecutor::finish`] or its token is cancelled.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use upgrade_coordinator::{ActionId, UpgradeError, UpgradeExecutor, UpgradeRequest, UpgradeResult};

/// Arguments of one `execute` call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Target version
    pub version: String,
    /// Artifact source
    pub source_uri: String,
    /// Request that launched the task
    pub action_id: ActionId,
    /// Retry flag passed by the coordinator
    pub is_retry: bool,
    /// Token handed to the task
    pub token: CancellationToken,
}

struct Slot {
    invocation: Invocation,
    release: Option<oneshot::Sender<UpgradeResult<()>>>,
}

/// [`UpgradeExecutor`] whose outcomes are decided by the test.
#[derive(Default)]
pub struct ScriptedExecutor {
    slots: Mutex<Vec<Slot>>,
    ignore_cancellation: bool,
}

impl ScriptedExecutor {
    /// Executor that returns [`UpgradeError::Cancelled`] as soon as its token fires.
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor that keeps running after cancellation until finished.
    ///
    /// Models an executor that observes cancellation late.
    pub fn ignoring_cancellation() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            ignore_cancellation: true,
        }
    }

    /// Number of `execute` calls so far.
    pub fn calls(&self) -> usize {
        self.slots.lock().len()
    }

    /// Arguments of the `index`-th call.
    pub fn invocation(&self, index: usize) -> Option<Invocation> {
        self.slots
            .lock()
            .get(index)
            .map(|slot| slot.invocation.clone())
    }

    /// Resolve the `index`-th call with `outcome`.
    ///
    /// Returns `false` if that call does not exist or has already returned.
    pub fn finish(&self, index: usize, outcome: UpgradeResult<()>) -> bool {
        let release = self
            .slots
            .lock()
            .get_mut(index)
            .and_then(|slot| slot.release.take());
        match release {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Wait until at least `count` calls have been made.
    pub async fn wait_for_calls(&self, count: usize) {
        crate::wait_until(&format!("{count} executor calls"), move || async move {
            self.calls() >= count
        })
        .await;
    }
}

#[async_trait]
impl UpgradeExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        token: CancellationToken,
        version: &str,
        source_uri: &str,
        request: &UpgradeRequest,
        is_retry: bool,
    ) -> UpgradeResult<()> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().push(Slot {
            invocation: Invocation {
                version: version.to_string(),
                source_uri: source_uri.to_string(),
                action_id: request.action_id().clone(),
                is_retry,
                token: token.clone(),
            },
            release: Some(tx),
        });

        let released = async {
            rx.await
                .unwrap_or_else(|_| Err(UpgradeError::execution("executor script dropped")))
        };

        if self.ignore_cancellation {
            return released.await;
        }
        tokio::select! {
            _ = token.cancelled() => Err(UpgradeError::Cancelled),
            outcome = released => outcome,
        }
    }
}
