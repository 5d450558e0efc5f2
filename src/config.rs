//! Staging configuration, loaded from JSON pushed by the page.

use serde::{Deserialize, Serialize};

/// Tunables for the staging subsystem. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Quiet window after the last allocation change before a preview is
    /// requested (0 = request immediately).
    pub preview_debounce_ms: u64,

    /// Hard cap on upgrade/weapon slot capacity.
    pub max_slots: u8,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            preview_debounce_ms: 150,
            max_slots: 4,
        }
    }
}

impl StagingConfig {
    pub fn with_debounce(mut self, ms: u64) -> Self {
        self.preview_debounce_ms = ms;
        self
    }

    /// Parse from JSON, rejecting a zero slot cap.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: StagingConfig =
            serde_json::from_str(json).map_err(|e| format!("Invalid config JSON: {}", e))?;
        if config.max_slots == 0 {
            return Err("Invalid slot cap: max_slots must be at least 1".to_string());
        }
        Ok(config)
    }
}
