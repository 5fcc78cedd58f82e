//! TOML configuration for the client binary.
//!
//! Every field has a default, so an absent file, an empty file, and a file
//! with only the sections the operator cares about all work. Timing knobs
//! are plain milliseconds in the file and converted to a
//! [`Tuning`] for the controller.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::controller::Tuning;
use crate::application::hotkey::ReleaseHotkey;
use crate::infrastructure::network::{
    ClientIdentity, MuxClientConfig, DEFAULT_EVENT_BUFFER, DEFAULT_SERVER_URL,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionSection,
    pub identity: IdentitySection,
    pub controller: ControllerSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub server_url: String,
    /// Bound of the event channel between the network client and the
    /// controller task.
    pub event_buffer: usize,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Identity strings sent in the login handshake. The version and build
/// date defaults track the companion library release the server expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    pub app_name: String,
    pub app_version: String,
    pub app_build_date: String,
    pub sdk_version: String,
    pub sdk_build_date: String,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            app_name: "Input-Mux Host".to_string(),
            app_version: "2.2.46".to_string(),
            app_build_date: "2026-02-05".to_string(),
            sdk_version: "2.2.35".to_string(),
            sdk_build_date: "2026-02-05".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    pub release_hotkey: ReleaseHotkey,
    /// Suppress native OS input on registered targets while remote input
    /// is active.
    pub block_native_input: bool,
    pub motion_throttle_ms: u64,
    pub roster_refresh_min_interval_ms: u64,
    pub stuck_pipeline_dwell_ms: u64,
    /// Host scroll units per raw wheel unit.
    pub wheel_scale: f32,
}

impl Default for ControllerSection {
    fn default() -> Self {
        let tuning = Tuning::default();
        Self {
            release_hotkey: ReleaseHotkey::default(),
            block_native_input: false,
            motion_throttle_ms: tuning.motion_throttle.as_millis() as u64,
            roster_refresh_min_interval_ms: tuning.roster_refresh_min_interval.as_millis() as u64,
            stuck_pipeline_dwell_ms: tuning.stuck_pipeline_dwell.as_millis() as u64,
            wheel_scale: tuning.wheel_scale,
        }
    }
}

impl ControllerSection {
    pub fn tuning(&self) -> Tuning {
        Tuning {
            motion_throttle: Duration::from_millis(self.motion_throttle_ms),
            roster_refresh_min_interval: Duration::from_millis(self.roster_refresh_min_interval_ms),
            stuck_pipeline_dwell: Duration::from_millis(self.stuck_pipeline_dwell_ms),
            wheel_scale: self.wheel_scale,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Tracing filter directive, e.g. `info` or `mux_client=debug`.
    /// `RUST_LOG` overrides it when set.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist. A file that exists but fails to parse is an
    /// error; silently ignoring a typo would be worse than refusing to
    /// start.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Builds the network client configuration out of the connection and
    /// identity sections.
    pub fn client_config(&self) -> MuxClientConfig {
        MuxClientConfig {
            server_url: self.connection.server_url.clone(),
            identity: ClientIdentity {
                app_name: self.identity.app_name.clone(),
                app_version: self.identity.app_version.clone(),
                app_build_date: self.identity.app_build_date.clone(),
                sdk_version: self.identity.sdk_version.clone(),
                sdk_build_date: self.identity.sdk_build_date.clone(),
            },
            event_buffer: self.connection.event_buffer,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
