//! Error types for upgrade coordination
//!
//! A single error enum covers the whole crate: boundary rejections, executor
//! outcomes and acknowledgment sink failures.

use crate::action::ActionKind;

/// Unified error type for upgrade coordination
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    /// An inbound action was not an upgrade request
    #[error("invalid type, expected UPGRADE action and received {kind}")]
    UnexpectedAction {
        /// Tag of the action that was received instead
        kind: ActionKind,
    },

    /// Upgrade request failed validation
    #[error("Invalid upgrade request: {message}")]
    Invalid {
        /// Error message describing the invalid field
        message: String,
    },

    /// The upgrade task observed cancellation of its token
    #[error("Upgrade cancelled")]
    Cancelled,

    /// The upgrade task failed for a reason other than cancellation
    #[error("Upgrade execution failed: {message}")]
    Execution {
        /// Error message reported by the executor
        message: String,
    },

    /// Recording an acknowledgment failed
    #[error("Ack failed: {message}")]
    Ack {
        /// Error message reported by the sink
        message: String,
    },

    /// Persisting recorded acknowledgments failed
    #[error("Ack commit failed: {message}")]
    Commit {
        /// Error message reported by the sink
        message: String,
    },

    /// Internal coordinator failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal failure
        message: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration problem
        message: String,
    },
}

impl UpgradeError {
    /// Create an unexpected action error
    pub fn unexpected_action(kind: ActionKind) -> Self {
        Self::UnexpectedAction { kind }
    }

    /// Create an invalid request error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create an ack error
    pub fn ack(message: impl Into<String>) -> Self {
        Self::Ack {
            message: message.into(),
        }
    }

    /// Create a commit error
    pub fn commit(message: impl Into<String>) -> Self {
        Self::Commit {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error reports cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for upgrade coordination
pub type UpgradeResult<T> = std::result::Result<T, UpgradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_action_names_the_received_tag() {
        let err = UpgradeError::unexpected_action(ActionKind::Unenroll);
        assert_eq!(
            err.to_string(),
            "invalid type, expected UPGRADE action and received UNENROLL"
        );
    }

    #[test]
    fn only_cancelled_classifies_as_cancellation() {
        assert!(UpgradeError::Cancelled.is_cancelled());
        assert!(!UpgradeError::execution("disk full").is_cancelled());
        assert!(!UpgradeError::ack("timeout").is_cancelled());
    }
}
