//! Upgrade Testing Infrastructure
//!
//! Test doubles for the coordinator's collaborators and small async helpers.
//!
//! ```toml
//! [dev-dependencies]
//! upgrade-testkit = { path = "../upgrade-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod executor;
pub mod sink;

pub use executor::{Invocation, ScriptedExecutor};
pub use sink::{RecordingAckSink, SinkEvent};

use std::future::Future;
use std::time::Duration;
use upgrade_coordinator::{ActionId, UpgradeRequest};

/// Upper bound for [`wait_until`].
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-writer tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds, panicking after [`WAIT_TIMEOUT`].
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Upgrade request with a fixed artifact source.
pub fn upgrade_request(id: &str, version: &str) -> UpgradeRequest {
    UpgradeRequest::new(id, version, "https://artifacts.example.com/downloads/")
}

/// Collect ids into an owned vector for assertions.
pub fn ids(raw: &[&str]) -> Vec<ActionId> {
    raw.iter().map(|id| ActionId::new(*id)).collect()
}
