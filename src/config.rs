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
//! Handles loading bridge settings, writing the defaults on first run.

use anyhow::{anyhow, Context, Result};
use bluer::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::ble_constants::{DEFAULT_ADDRESS, DEFAULT_AUTH_KEY, NOTIFY_UUID, WRITE_UUID};
use crate::bluetooth::CharacteristicUuids;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Appliance identity.
    pub device: DeviceConfig,

    /// Broker settings.
    pub mqtt: MqttConfig,

    /// Polling and protocol timing.
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Bluetooth address, e.g. "F9:DA:73:71:23:4A".
    pub address: String,

    /// 8-byte authorization key as 16 hex characters.
    pub auth_key: String,

    /// UUID of the characteristic commands are written to.
    pub write_uuid: String,

    /// UUID of the characteristic responses are notified on.
    pub notify_uuid: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            auth_key: hex::encode(DEFAULT_AUTH_KEY),
            write_uuid: WRITE_UUID.to_string(),
            notify_uuid: NOTIFY_UUID.to_string(),
        }
    }
}

/// Parsed form of [`DeviceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub address: Address,
    pub auth_key: [u8; 8],
    pub uuids: CharacteristicUuids,
}

impl DeviceConfig {
    pub fn profile(&self) -> Result<DeviceProfile> {
        let address: Address = self
            .address
            .parse()
            .with_context(|| format!("invalid device address '{}'", self.address))?;

        let key = hex::decode(&self.auth_key).context("auth_key is not hex")?;
        let auth_key: [u8; 8] = key
            .try_into()
            .map_err(|key: Vec<u8>| anyhow!("auth_key must be 8 bytes, got {}", key.len()))?;

        let write = Uuid::parse_str(&self.write_uuid)
            .with_context(|| format!("invalid write_uuid '{}'", self.write_uuid))?;
        let notify = Uuid::parse_str(&self.notify_uuid)
            .with_context(|| format!("invalid notify_uuid '{}'", self.notify_uuid))?;

        Ok(DeviceProfile {
            address,
            auth_key,
            uuids: CharacteristicUuids { write, notify },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,

    /// Retained state messages go here.
    pub state_topic: String,

    /// Any message here switches the appliance off.
    pub off_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: "m223s-bridge".to_string(),
            keep_alive_secs: 30,
            state_topic: "home/m223s/state".to_string(),
            off_topic: "home/m223s/off".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub polling_interval_ms: u64,
    pub write_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub discovery_cooldown_secs: u64,

    /// Disconnect once this much polling has passed on one connection.
    pub idle_disconnect_secs: u64,

    pub locate_rounds: usize,
    pub locate_round_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 7500,
            write_timeout_ms: 10_000,
            settle_delay_ms: 100,
            discovery_cooldown_secs: 60,
            idle_disconnect_secs: 600,
            locate_rounds: 5,
            locate_round_delay_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn discovery_cooldown(&self) -> Duration {
        Duration::from_secs(self.discovery_cooldown_secs)
    }

    pub fn idle_disconnect(&self) -> Duration {
        Duration::from_secs(self.idle_disconnect_secs)
    }

    pub fn locate_round_delay(&self) -> Duration {
        Duration::from_millis(self.locate_round_delay_ms)
    }
}

impl Config {
    /// Default location: `<config_dir>/m223s-bridge/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("m223s-bridge")
            .join("config.toml")
    }

    /// Load configuration from the default location or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            let config = Self::default();
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content)?;
            config
        };

        // Surface bad identity values at startup rather than on first cycle.
        config.device.profile()?;
        Ok(config)
    }
}
