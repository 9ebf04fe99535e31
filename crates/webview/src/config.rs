//! Host configuration
//!
//! Plain serde struct so hosts can keep it next to their own settings file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Multi-click classification thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiClickConfig {
    /// Maximum time between two presses that still counts as a repeat
    pub interval_ms: u64,
    /// Maximum per-axis pointer travel between two presses, in view pixels
    pub tolerance_px: i32,
}

impl Default for MultiClickConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            tolerance_px: 4,
        }
    }
}

impl MultiClickConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Fixed application identifier, names the root cache directory
    pub app_id: String,
    /// Explicit root cache directory. Derived from `app_id` when unset.
    pub cache_root: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub persist_session_cookies: bool,
    pub windowless_frame_rate: u32,
    /// Let the engine render its own error pages instead of ours
    pub engine_error_ui: bool,
    pub multi_click: MultiClickConfig,
    /// Wait between requesting closes and shutting the engine down on quit
    pub quit_grace_ms: u64,
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            app_id: "webview-host".to_string(),
            cache_root: None,
            user_agent: None,
            persist_session_cookies: true,
            windowless_frame_rate: 30,
            engine_error_ui: false,
            multi_click: MultiClickConfig::default(),
            quit_grace_ms: 500,
            event_capacity: 1024,
        }
    }
}

impl HostConfig {
    /// Root directory holding every profile's storage.
    ///
    /// Explicit `cache_root` wins; otherwise the platform cache directory,
    /// falling back to the temp directory when there is none.
    pub fn cache_root(&self) -> PathBuf {
        if let Some(root) = &self.cache_root {
            return root.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(&self.app_id)
    }

    pub fn quit_grace(&self) -> Duration {
        Duration::from_millis(self.quit_grace_ms)
    }
}
