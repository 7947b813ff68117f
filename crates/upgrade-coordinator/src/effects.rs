//! Collaborator contracts consumed by the coordinator.
//!
//! Both traits are object safe and are held as `Arc<dyn ...>`. Implementations
//! must be safe to call from any task without external synchronization.

use crate::action::UpgradeRequest;
use crate::error::UpgradeResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Performs the actual upgrade: download, verification, installation, restart.
#[async_trait]
pub trait UpgradeExecutor: Send + Sync {
    /// Run the upgrade to `version` using the artifact at `source_uri`.
    ///
    /// Must observe `token` cooperatively and return
    /// [`UpgradeError::Cancelled`](crate::UpgradeError::Cancelled) promptly
    /// once it fires.
    async fn execute(
        &self,
        token: CancellationToken,
        version: &str,
        source_uri: &str,
        request: &UpgradeRequest,
        is_retry: bool,
    ) -> UpgradeResult<()>;
}

/// Durable record of per-request outcomes.
#[async_trait]
pub trait AckSink: Send + Sync {
    /// Record the outcome for one request.
    async fn ack(&self, token: &CancellationToken, request: &UpgradeRequest) -> UpgradeResult<()>;

    /// Persist every acknowledgment recorded so far.
    async fn commit(&self, token: &CancellationToken) -> UpgradeResult<()>;
}
