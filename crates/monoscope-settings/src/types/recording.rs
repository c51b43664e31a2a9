use serde::{Deserialize, Serialize};

/// Options handed to the replay recorder when recording starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingSettings {
    /// Mask the value of every input field.
    pub mask_all_inputs: bool,
    /// CSS selectors of inputs to mask when `mask_all_inputs` is off.
    pub mask_input_selectors: Vec<String>,
    /// CSS selectors of elements that are not recorded at all.
    pub block_selectors: Vec<String>,
    /// Take a fresh full snapshot this often (ms). None disables checkouts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_every_ms: Option<u64>,
    pub sampling: SamplingSettings,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            mask_all_inputs: true,
            mask_input_selectors: Vec::new(),
            block_selectors: Vec::new(),
            checkout_every_ms: Some(10 * 60 * 1000),
            sampling: SamplingSettings::default(),
        }
    }
}

/// Interaction sampling for high-frequency DOM signals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingSettings {
    /// Minimum gap between recorded mouse moves (ms).
    pub mousemove_ms: u64,
    /// Scroll events are coalesced over this window (ms).
    pub scroll_ms: u64,
    /// Record only the final value of an input burst.
    pub input_last_only: bool,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            mousemove_ms: 50,
            scroll_ms: 150,
            input_last_only: true,
        }
    }
}
