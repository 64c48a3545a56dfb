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

//! The Bluetooth stack as seen by the session: an object tree that can be
//! walked and queried, plus the handful of calls the session makes on it.

use anyhow::Result;
use bluer::Address;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Address of a node in the BlueZ object tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GattPath {
    /// `/org/bluez`, whose children are the adapters.
    Root,
    Adapter {
        adapter: String,
    },
    Device {
        adapter: String,
        address: Address,
    },
    Service {
        adapter: String,
        address: Address,
        service: u16,
    },
    Characteristic {
        adapter: String,
        address: Address,
        service: u16,
        characteristic: u16,
    },
}

impl GattPath {
    /// Name of the adapter this node hangs off.
    pub fn adapter_name(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Adapter { adapter }
            | Self::Device { adapter, .. }
            | Self::Service { adapter, .. }
            | Self::Characteristic { adapter, .. } => Some(adapter),
        }
    }

    /// Child node for a device on this adapter.
    pub fn device(&self, address: Address) -> Option<Self> {
        match self {
            Self::Adapter { adapter } => Some(Self::Device {
                adapter: adapter.clone(),
                address,
            }),
            _ => None,
        }
    }

    /// Child node for a service on this device.
    pub fn service(&self, service: u16) -> Option<Self> {
        match self {
            Self::Device { adapter, address } => Some(Self::Service {
                adapter: adapter.clone(),
                address: *address,
                service,
            }),
            _ => None,
        }
    }

    /// Child node for a characteristic of this service.
    pub fn characteristic(&self, characteristic: u16) -> Option<Self> {
        match self {
            Self::Service {
                adapter,
                address,
                service,
            } => Some(Self::Characteristic {
                adapter: adapter.clone(),
                address: *address,
                service: *service,
                characteristic,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for GattPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "/org/bluez"),
            Self::Adapter { adapter } => write!(f, "/org/bluez/{adapter}"),
            Self::Device { adapter, address } => {
                write!(f, "/org/bluez/{adapter}/dev_{}", device_segment(address))
            }
            Self::Service {
                adapter,
                address,
                service,
            } => write!(
                f,
                "/org/bluez/{adapter}/dev_{}/service{service:04x}",
                device_segment(address)
            ),
            Self::Characteristic {
                adapter,
                address,
                service,
                characteristic,
            } => write!(
                f,
                "/org/bluez/{adapter}/dev_{}/service{service:04x}/char{characteristic:04x}",
                device_segment(address)
            ),
        }
    }
}

fn device_segment(address: &Address) -> String {
    address.to_string().replace(':', "_")
}

/// Calls the session makes on the Bluetooth stack.
///
/// Implemented over BlueZ by [`super::BluezBus`]; tests substitute a scripted
/// tree. Property reads (`children`, `uuid`, `device_address`,
/// `is_connected`) are short local calls; `connect` and `write_command` reach
/// the appliance.
#[allow(async_fn_in_trait)]
pub trait BleBus {
    /// Immediate children of `path`, in the order the stack lists them.
    async fn children(&self, path: &GattPath) -> Result<Vec<GattPath>>;

    /// UUID attribute of `path`, if the node carries one.
    async fn uuid(&self, path: &GattPath) -> Result<Option<Uuid>>;

    /// Address attribute of a device node.
    async fn device_address(&self, device: &GattPath) -> Result<Option<Address>>;

    /// Live connection status of a device.
    async fn is_connected(&self, device: &GattPath) -> Result<bool>;

    async fn connect(&self, device: &GattPath) -> Result<()>;

    async fn disconnect(&self, device: &GattPath) -> Result<()>;

    /// Begin an active scan on `adapter`.
    async fn start_discovery(&self, adapter: &str) -> Result<()>;

    async fn stop_discovery(&self, adapter: &str) -> Result<()>;

    /// Open the standing value-change subscription for a characteristic.
    ///
    /// Values pushed by the appliance go to `sink` for the rest of the
    /// process, across reconnects.
    async fn subscribe(
        &self,
        characteristic: &GattPath,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<()>;

    /// Ask the appliance to start notifying on a subscribed characteristic.
    async fn start_notify(&self, characteristic: &GattPath) -> Result<()>;

    async fn stop_notify(&self, characteristic: &GattPath) -> Result<()>;

    /// Write `value` as a command write and wait for the stack to acknowledge it.
    async fn write_command(&self, characteristic: &GattPath, value: &[u8]) -> Result<()>;
}
