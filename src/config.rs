// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::sdp::{ServiceRecord, DEBUG_SERVICE_UUID, DEFAULT_SERVICE_NAME};

const APP_DIR: &str = "touch-debug-bridge";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Published service record.
    pub service: ServiceConfig,

    /// Adapter settings.
    pub bluetooth: BluetoothConfig,

    /// Channel bridge settings.
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service class UUID advertised and looked up on peers.
    pub uuid: Uuid,

    /// Service name attribute.
    pub name: String,

    /// RFCOMM channel to request; 0 lets the stack allocate one.
    pub channel: u8,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            uuid: DEBUG_SERVICE_UUID,
            name: DEFAULT_SERVICE_NAME.to_string(),
            channel: 0,
        }
    }
}

impl ServiceConfig {
    pub fn record(&self) -> ServiceRecord {
        ServiceRecord::new(self.uuid, self.name.clone()).with_channel(self.channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter name such as `hci0`. The default adapter when unset.
    pub adapter: Option<String>,

    /// Power the adapter on at startup if it is off.
    pub power_on: bool,

    /// Make the adapter discoverable so peers can find the service.
    pub discoverable: bool,

    /// Alias to advertise for the adapter.
    pub alias: Option<String>,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            power_on: true,
            discoverable: true,
            alias: None,
        }
    }
}

/// What to do when a second peer shows up while one is being bridged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPolicy {
    /// Keep the current peer and ignore the newcomer.
    #[default]
    Reject,
    /// Drop the current peer and bridge the newcomer.
    Supersede,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long to wait for an RFCOMM open to complete.
    pub open_timeout_ms: u64,

    /// How long a peer's service lookup may take.
    pub sdp_timeout_ms: u64,

    pub connection_policy: ConnectionPolicy,

    /// Writes are split into pieces of at most this many bytes.
    pub write_chunk_size: usize,

    /// Size of the channel read buffer.
    pub read_buffer_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: 10_000,
            sdp_timeout_ms: 5_000,
            connection_policy: ConnectionPolicy::Reject,
            write_chunk_size: 1013,
            read_buffer_size: 1024,
        }
    }
}

impl BridgeConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn sdp_timeout(&self) -> Duration {
        Duration::from_millis(self.sdp_timeout_ms)
    }
}

impl Config {
    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from `path` (or the default location), writing the
    /// defaults there first if the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
