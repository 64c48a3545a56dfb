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

//! Finding the appliance among the devices BlueZ knows about.

use bluer::Address;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::bus::{BleBus, GattPath};
use crate::error::SessionError;

/// Rate limit for active scans.
#[derive(Debug, Clone)]
pub struct DiscoveryThrottle {
    cooldown: Duration,
    last_start: Option<Instant>,
}

impl DiscoveryThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_start: None,
        }
    }

    /// Claim a scan slot. Returns `false` inside the cooldown window.
    pub fn try_start(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_start {
            if now.duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_start = Some(now);
        true
    }
}

/// Locator for a single device address.
#[derive(Debug)]
pub struct DeviceLocator {
    target: Address,
    rounds: usize,
    round_delay: Duration,
    throttle: Mutex<DiscoveryThrottle>,
}

impl DeviceLocator {
    pub fn new(target: Address, rounds: usize, round_delay: Duration, cooldown: Duration) -> Self {
        Self {
            target,
            rounds,
            round_delay,
            throttle: Mutex::new(DiscoveryThrottle::new(cooldown)),
        }
    }

    pub fn target(&self) -> Address {
        self.target
    }

    /// Search all adapters for the target device.
    ///
    /// After the first empty round an active scan is started (if the
    /// throttle allows) and stopped again before returning.
    pub async fn locate<B: BleBus>(&self, bus: &B) -> Result<GattPath, SessionError> {
        let mut scanning: Vec<String> = Vec::new();
        let mut scan_tried = false;
        let mut found = None;

        for round in 0..self.rounds {
            let adapters = match bus.children(&GattPath::Root).await {
                Ok(adapters) => adapters,
                Err(e) => {
                    warn!("Can't enumerate adapters: {:#}", e);
                    Vec::new()
                }
            };

            found = self.find_on(bus, &adapters).await;
            if found.is_some() {
                break;
            }

            // The cooldown slot is only claimed when there is an adapter to scan on.
            if !scan_tried && !adapters.is_empty() {
                scan_tried = true;
                scanning = self.start_scan(bus, &adapters).await;
            }

            if round + 1 < self.rounds {
                tokio::time::sleep(self.round_delay).await;
            }
        }

        for adapter in scanning {
            match bus.stop_discovery(&adapter).await {
                Ok(()) => info!("Stopped discovery on {}", adapter),
                Err(e) => warn!("Can't stop discovery on {}: {:#}", adapter, e),
            }
        }

        found.ok_or(SessionError::DeviceNotFound(self.target))
    }

    async fn find_on<B: BleBus>(&self, bus: &B, adapters: &[GattPath]) -> Option<GattPath> {
        for adapter in adapters {
            let devices = match bus.children(adapter).await {
                Ok(devices) => devices,
                Err(e) => {
                    warn!("Can't enumerate devices on {}: {:#}", adapter, e);
                    continue;
                }
            };

            for device in devices {
                match bus.device_address(&device).await {
                    Ok(Some(address)) if address == self.target => {
                        debug!("Found {} at {}", self.target, device);
                        return Some(device);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Can't read address of {}: {:#}", device, e),
                }
            }
        }
        None
    }

    /// Start scanning on every adapter; returns those where it started.
    async fn start_scan<B: BleBus>(&self, bus: &B, adapters: &[GattPath]) -> Vec<String> {
        if !self.throttle.lock().try_start() {
            info!("Skipping discovery");
            return Vec::new();
        }

        let mut started = Vec::new();
        for adapter in adapters.iter().filter_map(GattPath::adapter_name) {
            match bus.start_discovery(adapter).await {
                Ok(()) => {
                    info!("Started discovery on {}", adapter);
                    started.push(adapter.to_string());
                }
                Err(e) => warn!("Can't start discovery on {}: {:#}", adapter, e),
            }
        }
        started
    }
}
