//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default orientation polling period in milliseconds
pub const DEFAULT_ORIENTATION_POLL_INTERVAL_MS: u64 = 100;

/// Default request code tagging this bridge's permission prompts
pub const DEFAULT_PERMISSION_REQUEST_CODE: i32 = 3543;

/// Tunables of the camera bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraXConfig {
    /// How often the display rotation is polled
    #[serde(default = "default_orientation_poll_interval_ms")]
    pub orientation_poll_interval_ms: u64,

    /// Request code used for permission prompts; results carrying any other
    /// code are ignored
    #[serde(default = "default_permission_request_code")]
    pub permission_request_code: i32,
}

fn default_orientation_poll_interval_ms() -> u64 {
    DEFAULT_ORIENTATION_POLL_INTERVAL_MS
}

fn default_permission_request_code() -> i32 {
    DEFAULT_PERMISSION_REQUEST_CODE
}

impl Default for CameraXConfig {
    fn default() -> Self {
        Self {
            orientation_poll_interval_ms: DEFAULT_ORIENTATION_POLL_INTERVAL_MS,
            permission_request_code: DEFAULT_PERMISSION_REQUEST_CODE,
        }
    }
}

impl CameraXConfig {
    /// Polling period, never shorter than one millisecond
    pub fn orientation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.orientation_poll_interval_ms.max(1))
    }
}
