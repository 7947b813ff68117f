//! Inbound Fleet actions and the upgrade request narrowed from them.
//!
//! Actions arrive as a tagged variant. The coordinator only accepts the
//! `UPGRADE` variant; everything else is rejected at the boundary with the
//! tag of what was actually received.

use crate::error::{UpgradeError, UpgradeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity used to acknowledge an action.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Create an action id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single request to upgrade the agent to `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRequest {
    action_id: ActionId,
    version: String,
    source_uri: String,
    #[serde(default)]
    retry_attempt: u32,
}

impl UpgradeRequest {
    /// Create a first-attempt upgrade request.
    pub fn new(
        action_id: impl Into<ActionId>,
        version: impl Into<String>,
        source_uri: impl Into<String>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            version: version.into(),
            source_uri: source_uri.into(),
            retry_attempt: 0,
        }
    }

    /// Mark this request as the `attempt`-th retry of an earlier upgrade.
    pub fn with_retry_attempt(mut self, attempt: u32) -> Self {
        self.retry_attempt = attempt;
        self
    }

    /// Identity used when acknowledging this request.
    pub fn action_id(&self) -> &ActionId {
        &self.action_id
    }

    /// Target version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Where the upgrade artifact is fetched from.
    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    /// Retry counter carried by the action, zero for a first attempt.
    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    /// Whether the executor should treat this run as a retry.
    pub fn is_retry(&self) -> bool {
        self.retry_attempt > 0
    }
}

/// Tag of a [`FleetAction`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Upgrade the agent
    Upgrade,
    /// Unenroll the agent from Fleet
    Unenroll,
    /// Apply a new policy
    PolicyChange,
    /// Change agent settings
    Settings,
}

impl ActionKind {
    /// Wire tag of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upgrade => "UPGRADE",
            Self::Unenroll => "UNENROLL",
            Self::PolicyChange => "POLICY_CHANGE",
            Self::Settings => "SETTINGS",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action delivered to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FleetAction {
    /// Upgrade to a target version
    #[serde(rename = "UPGRADE")]
    Upgrade(UpgradeRequest),
    /// Unenroll the agent
    #[serde(rename = "UNENROLL")]
    Unenroll {
        /// Action identity
        action_id: ActionId,
    },
    /// Replace the running policy
    #[serde(rename = "POLICY_CHANGE")]
    PolicyChange {
        /// Action identity
        action_id: ActionId,
        /// Policy document, opaque to this crate
        policy: serde_json::Value,
    },
    /// Update agent settings
    #[serde(rename = "SETTINGS")]
    Settings {
        /// Action identity
        action_id: ActionId,
        /// Requested log level
        log_level: String,
    },
}

impl FleetAction {
    /// Tag of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Upgrade(_) => ActionKind::Upgrade,
            Self::Unenroll { .. } => ActionKind::Unenroll,
            Self::PolicyChange { .. } => ActionKind::PolicyChange,
            Self::Settings { .. } => ActionKind::Settings,
        }
    }

    /// Identity of this action.
    pub fn action_id(&self) -> &ActionId {
        match self {
            Self::Upgrade(request) => request.action_id(),
            Self::Unenroll { action_id }
            | Self::PolicyChange { action_id, .. }
            | Self::Settings { action_id, .. } => action_id,
        }
    }

    /// Decode an action from its JSON wire form.
    pub fn from_json(bytes: &[u8]) -> UpgradeResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| UpgradeError::invalid(format!("malformed action: {e}")))
    }
}

impl From<UpgradeRequest> for FleetAction {
    fn from(request: UpgradeRequest) -> Self {
        Self::Upgrade(request)
    }
}

impl TryFrom<FleetAction> for UpgradeRequest {
    type Error = UpgradeError;

    fn try_from(action: FleetAction) -> UpgradeResult<Self> {
        match action {
            FleetAction::Upgrade(request) if request.version.is_empty() => Err(
                UpgradeError::invalid(format!("action {} has an empty version", request.action_id)),
            ),
            FleetAction::Upgrade(request) => Ok(request),
            other => Err(UpgradeError::unexpected_action(other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_action_decodes_from_tagged_json() {
        let raw = br#"{
            "type": "UPGRADE",
            "action_id": "action-1",
            "version": "8.12.0",
            "source_uri": "https://artifacts.example.com/downloads/"
        }"#;

        let action = FleetAction::from_json(raw).unwrap();
        assert_eq!(action.kind(), ActionKind::Upgrade);

        let request = UpgradeRequest::try_from(action).unwrap();
        assert_eq!(request.action_id().as_str(), "action-1");
        assert_eq!(request.version(), "8.12.0");
        assert_eq!(request.retry_attempt(), 0);
        assert!(!request.is_retry());
    }

    #[test]
    fn retry_attempt_is_carried_through() {
        let raw = br#"{"type":"UPGRADE","action_id":"a","version":"1.0.0","source_uri":"","retry_attempt":2}"#;
        let request = UpgradeRequest::try_from(FleetAction::from_json(raw).unwrap()).unwrap();
        assert!(request.is_retry());
    }

    #[test]
    fn non_upgrade_actions_are_rejected_with_their_tag() {
        let action = FleetAction::Settings {
            action_id: ActionId::new("settings-1"),
            log_level: "debug".to_string(),
        };

        let err = UpgradeRequest::try_from(action).unwrap_err();
        assert_eq!(
            err,
            UpgradeError::UnexpectedAction {
                kind: ActionKind::Settings
            }
        );
    }

    #[test]
    fn empty_version_is_invalid() {
        let action = FleetAction::from(UpgradeRequest::new("a", "", "https://example.com"));
        assert!(matches!(
            UpgradeRequest::try_from(action),
            Err(UpgradeError::Invalid { .. })
        ));
    }

    #[test]
    fn unknown_tag_fails_to_decode() {
        let raw = br#"{"type":"REBOOT","action_id":"a"}"#;
        assert!(FleetAction::from_json(raw).is_err());
    }

    #[test]
    fn action_id_is_reachable_from_every_variant() {
        let unenroll = FleetAction::Unenroll {
            action_id: ActionId::new("u-1"),
        };
        let policy = FleetAction::PolicyChange {
            action_id: ActionId::new("p-1"),
            policy: serde_json::json!({ "inputs": [] }),
        };
        assert_eq!(unenroll.action_id().as_str(), "u-1");
        assert_eq!(policy.action_id().as_str(), "p-1");
        assert_eq!(policy.kind().to_string(), "POLICY_CHANGE");
    }
}
