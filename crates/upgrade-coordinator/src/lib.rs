//! Upgrade Coordinator
//!
//! Coordinates agent upgrade actions delivered by Fleet so that at most one
//! upgrade runs at a time, duplicate and superseded actions are resolved
//! deterministically, and every action is acknowledged exactly once.
//!
//! The upgrade mechanics and the acknowledgment transport are collaborators
//! supplied by the caller through [`UpgradeExecutor`] and [`AckSink`].
//!
//! ```rust,ignore
//! use upgrade_coordinator::{FleetAction, UpgradeCoordinator};
//! use tokio_util::sync::CancellationToken;
//!
//! let coordinator = UpgradeCoordinator::new(executor, acker);
//! let shutdown = CancellationToken::new();
//!
//! // Returns as soon as the action is admitted; the upgrade runs in the background.
//! coordinator.submit(&shutdown, FleetAction::from_json(&payload)?).await?;
//! ```

#![forbid(unsafe_code)]

pub mod action;
pub mod config;
pub mod coordinator;
pub mod effects;
pub mod endpoint;
pub mod error;

pub use action::{ActionId, ActionKind, FleetAction, UpgradeRequest};
pub use config::CoordinatorConfig;
pub use coordinator::{BatchSnapshot, UpgradeCoordinator};
pub use effects::{AckSink, UpgradeExecutor};
pub use error::{UpgradeError, UpgradeResult};

pub use tokio_util::sync::CancellationToken;
