//! Upgrade Coordinator - single-flight execution of upgrade actions
//!
//! Upgrade actions return immediately; the upgrade itself runs as a background
//! task. At most one task runs at a time:
//!
//! - **Start**: nothing pending, so the request opens a new batch and a task is
//!   spawned with a child of the caller's token.
//! - **Join**: a batch for the same version is pending, so the request is
//!   appended and acknowledged together with that task's outcome.
//! - **Supersede**: a batch for a different version is pending, so its task is
//!   cancelled, the old batch is flushed, and the request starts a new batch.
//!
//! When a task ends on its own, its completion handler flushes the batch it
//! started. A superseded task finds a newer generation in place and leaves
//! acknowledgment to the superseding call, so every request is acknowledged
//! exactly once.
//!
//! # Locking
//!
//! Uses `tokio::sync::Mutex` because flushing awaits the ack sink while the
//! batch is held. The executor always runs outside the lock.

use crate::action::{ActionId, FleetAction, UpgradeRequest};
use crate::config::CoordinatorConfig;
use crate::effects::{AckSink, UpgradeExecutor};
use crate::error::{UpgradeError, UpgradeResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of the pending batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSnapshot {
    /// Version shared by every request in the batch
    pub version: String,
    /// Action ids in join order
    pub action_ids: Vec<ActionId>,
}

/// Requests owned by the in-flight task, all sharing one version.
#[derive(Debug, Default)]
struct PendingBatch {
    requests: Vec<UpgradeRequest>,
    cancel: Option<CancellationToken>,
    generation: u64,
}

impl PendingBatch {
    fn version(&self) -> Option<&str> {
        self.requests.first().map(UpgradeRequest::version)
    }

    /// Open a new batch for `request`. The batch must be empty.
    fn start(&mut self, parent: &CancellationToken, request: UpgradeRequest) -> Launch {
        debug_assert!(self.requests.is_empty());
        let token = parent.child_token();
        self.generation += 1;
        self.requests.push(request.clone());
        self.cancel = Some(token.clone());
        Launch {
            request,
            token,
            generation: self.generation,
        }
    }

    fn take(&mut self) -> Vec<UpgradeRequest> {
        self.cancel = None;
        std::mem::take(&mut self.requests)
    }

    fn snapshot(&self) -> Option<BatchSnapshot> {
        let version = self.version()?.to_string();
        Some(BatchSnapshot {
            version,
            action_ids: self
                .requests
                .iter()
                .map(|request| request.action_id().clone())
                .collect(),
        })
    }
}

/// Everything a background task needs, handed out by the admit decision.
struct Launch {
    request: UpgradeRequest,
    token: CancellationToken,
    generation: u64,
}

struct CoordinatorInner {
    executor: Arc<dyn UpgradeExecutor>,
    sink: Arc<dyn AckSink>,
    config: CoordinatorConfig,
    batch: Mutex<PendingBatch>,
}

/// Coordinates upgrade actions so that at most one upgrade runs at a time.
///
/// Cloning is cheap; clones share the same pending batch.
#[derive(Clone)]
pub struct UpgradeCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl UpgradeCoordinator {
    /// Create a coordinator with the default configuration.
    pub fn new(executor: Arc<dyn UpgradeExecutor>, sink: Arc<dyn AckSink>) -> Self {
        Self::with_config(executor, sink, CoordinatorConfig::default())
    }

    /// Create a coordinator with an explicit configuration.
    pub fn with_config(
        executor: Arc<dyn UpgradeExecutor>,
        sink: Arc<dyn AckSink>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                executor,
                sink,
                config,
                batch: Mutex::new(PendingBatch::default()),
            }),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Handle an inbound action. Returns once the start/join/supersede
    /// decision is made; the upgrade itself runs in the background.
    ///
    /// `parent` bounds the decision path (including the flush performed on
    /// supersession) and is the parent of the spawned task's token.
    ///
    /// The decision runs as its own Tokio task, so dropping this future (for
    /// example under `tokio::time::timeout`) never abandons a supersession
    /// halfway: the old batch is still acknowledged and the new upgrade
    /// still starts.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::UnexpectedAction`](crate::UpgradeError::UnexpectedAction)
    /// for non-upgrade actions and [`UpgradeError::Invalid`](crate::UpgradeError::Invalid)
    /// for an upgrade without a version. Neither touches the pending batch.
    ///
    /// # Panics
    ///
    /// Panics when polled outside a Tokio runtime, since both the decision
    /// and the upgrade are spawned with [`tokio::spawn`].
    pub async fn submit(&self, parent: &CancellationToken, action: FleetAction) -> UpgradeResult<()> {
        tracing::debug!(
            kind = %action.kind(),
            action_id = %action.action_id(),
            "upgrade handler received action"
        );
        let request = UpgradeRequest::try_from(action).map_err(|err| {
            tracing::error!(error = %err, "rejecting action");
            err
        })?;

        let inner = Arc::clone(&self.inner);
        let parent = parent.clone();
        tokio::spawn(async move {
            if let Some(launch) = inner.admit(&parent, request).await {
                Self::spawn(inner, launch);
            }
        })
        .await
        .map_err(|e| UpgradeError::internal(format!("upgrade admission task failed: {e}")))
    }

    /// Convenience wrapper for callers that already hold an [`UpgradeRequest`].
    pub async fn submit_request(
        &self,
        parent: &CancellationToken,
        request: UpgradeRequest,
    ) -> UpgradeResult<()> {
        self.submit(parent, FleetAction::Upgrade(request)).await
    }

    /// Current pending batch, `None` when idle.
    pub async fn snapshot(&self) -> Option<BatchSnapshot> {
        self.inner.batch.lock().await.snapshot()
    }

    /// Whether no upgrade is pending.
    pub async fn is_idle(&self) -> bool {
        self.inner.batch.lock().await.requests.is_empty()
    }

    fn spawn(inner: Arc<CoordinatorInner>, launch: Launch) {
        tokio::spawn(async move {
            let Launch {
                request,
                token,
                generation,
            } = launch;
            tracing::info!(
                version = request.version(),
                action_id = %request.action_id(),
                "starting upgrade in background"
            );
            let outcome = inner
                .executor
                .execute(
                    token.clone(),
                    request.version(),
                    request.source_uri(),
                    &request,
                    request.is_retry(),
                )
                .await;
            inner.complete(generation, &token, outcome).await;
        });
    }
}

impl CoordinatorInner {
    /// Decide start/join/supersede under the lock. Returns the task to launch,
    /// if any.
    ///
    /// Every state change happens before the first await, so the batch is
    /// consistent at each suspension point.
    async fn admit(&self, parent: &CancellationToken, request: UpgradeRequest) -> Option<Launch> {
        let mut batch = self.batch.lock().await;

        let Some(pending) = batch.version().map(str::to_owned) else {
            return Some(batch.start(parent, request));
        };

        if pending == request.version() {
            tracing::info!(
                version = %pending,
                action_id = %request.action_id(),
                "duplicate upgrade received, joining pending batch"
            );
            batch.requests.push(request);
            return None;
        }

        tracing::info!(
            pending = %pending,
            version = request.version(),
            "cancelling upgrade superseded by a different version"
        );
        if let Some(cancel) = batch.cancel.take() {
            cancel.cancel();
        }
        let superseded = batch.take();
        let launch = batch.start(parent, request);

        // Held across the flush so the new task starts only after the old
        // batch is acknowledged.
        self.flush(superseded, parent).await;
        Some(launch)
    }

    async fn complete(
        &self,
        generation: u64,
        token: &CancellationToken,
        outcome: UpgradeResult<()>,
    ) {
        let mut batch = self.batch.lock().await;
        if batch.generation != generation || batch.requests.is_empty() {
            tracing::debug!(
                generation,
                current = batch.generation,
                "superseded upgrade finished, its batch was already acknowledged"
            );
            return;
        }

        let version = batch.version().unwrap_or_default().to_string();
        match &outcome {
            Ok(()) => tracing::info!(version = %version, "upgrade completed"),
            Err(err) if err.is_cancelled() => {
                tracing::warn!(version = %version, "upgrade cancelled by its parent context");
            }
            Err(err) => tracing::error!(version = %version, error = %err, "upgrade failed"),
        }

        if outcome.is_ok() && !self.config.ack_on_success {
            let dropped = batch.take();
            tracing::info!(
                version = %version,
                batch_size = dropped.len(),
                "leaving successful upgrade unacknowledged for the restarted agent"
            );
            return;
        }

        let requests = batch.take();
        self.flush(requests, token).await;
    }

    /// Acknowledge every request taken from a batch, then commit once.
    /// Sink failures are logged and never stop the flush.
    async fn flush(&self, requests: Vec<UpgradeRequest>, token: &CancellationToken) {
        for request in &requests {
            if let Err(err) = self.sink.ack(token, request).await {
                tracing::error!(
                    action_id = %request.action_id(),
                    error = %err,
                    "ack of upgrade action failed"
                );
            }
        }
        if let Err(err) = self.sink.commit(token).await {
            tracing::error!(
                batch_size = requests.len(),
                error = %err,
                "commit of upgrade acks failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, version: &str) -> UpgradeRequest {
        UpgradeRequest::new(id, version, "https://artifacts.example.com")
    }

    #[test]
    fn start_bumps_generation_and_tracks_token() {
        let parent = CancellationToken::new();
        let mut batch = PendingBatch::default();

        let first = batch.start(&parent, request("a", "1.0.0"));
        assert_eq!(first.generation, 1);
        assert_eq!(batch.version(), Some("1.0.0"));
        assert!(batch.cancel.is_some());

        batch.take();
        let second = batch.start(&parent, request("b", "2.0.0"));
        assert_eq!(second.generation, 2);
    }

    #[test]
    fn task_token_follows_parent_cancellation() {
        let parent = CancellationToken::new();
        let mut batch = PendingBatch::default();
        let launch = batch.start(&parent, request("a", "1.0.0"));

        parent.cancel();
        assert!(launch.token.is_cancelled());
    }

    #[test]
    fn cancelling_task_token_leaves_parent_alone() {
        let parent = CancellationToken::new();
        let mut batch = PendingBatch::default();
        let launch = batch.start(&parent, request("a", "1.0.0"));

        launch.token.cancel();
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn take_empties_batch_and_drops_cancel_handle() {
        let parent = CancellationToken::new();
        let mut batch = PendingBatch::default();
        batch.start(&parent, request("a", "1.0.0"));
        batch.requests.push(request("b", "1.0.0"));

        let taken = batch.take();
        assert_eq!(taken.len(), 2);
        assert!(batch.requests.is_empty());
        assert!(batch.cancel.is_none());
        assert!(batch.snapshot().is_none());
    }

    #[test]
    fn snapshot_preserves_join_order() {
        let parent = CancellationToken::new();
        let mut batch = PendingBatch::default();
        batch.start(&parent, request("a", "1.0.0"));
        batch.requests.push(request("b", "1.0.0"));
        batch.requests.push(request("c", "1.0.0"));

        let snapshot = batch.snapshot().unwrap();
        assert_eq!(snapshot.version, "1.0.0");
        assert_eq!(
            snapshot.action_ids,
            vec![ActionId::new("a"), ActionId::new("b"), ActionId::new("c")]
        );
    }
}
