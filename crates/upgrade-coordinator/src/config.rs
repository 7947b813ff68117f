//! Coordinator Configuration

use crate::error::{UpgradeError, UpgradeResult};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Flush the batch when its upgrade task completes successfully.
    ///
    /// Disable when the executor restarts the process on success and the
    /// restarted agent reports the outcome itself. The batch is still cleared.
    #[serde(default = "default_true")]
    pub ack_on_success: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ack_on_success: true,
        }
    }
}

impl CoordinatorConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> UpgradeResult<Self> {
        toml::from_str(raw)
            .map_err(|e| UpgradeError::config(format!("Failed to parse coordinator config: {e}")))
    }
}
