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

//! BlueZ client implementation of [`BleBus`].

use anyhow::{anyhow, bail, Result};
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{Adapter, AdapterEvent, Address, Device};
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::bus::{BleBus, GattPath};

/// Standing subscription: where forwarded values go.
struct Subscription {
    path: GattPath,
    tx: mpsc::Sender<Vec<u8>>,
}

/// BlueZ-backed Bluetooth bus.
pub struct BluezBus {
    session: bluer::Session,
    subscription: Mutex<Option<Subscription>>,
    notify_task: Mutex<Option<JoinHandle<()>>>,
    scans: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl BluezBus {
    /// Open a BlueZ session on the system bus.
    pub async fn new() -> Result<Self> {
        info!("Connecting to BlueZ...");

        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapters = session.adapter_names().await?;
        info!("Found {} adapters", adapters.len());

        Ok(Self {
            session,
            subscription: Mutex::new(None),
            notify_task: Mutex::new(None),
            scans: Mutex::new(HashMap::new()),
        })
    }

    fn adapter(&self, name: &str) -> Result<Adapter> {
        Ok(self.session.adapter(name)?)
    }

    fn device(&self, path: &GattPath) -> Result<Device> {
        match path {
            GattPath::Device { adapter, address }
            | GattPath::Service {
                adapter, address, ..
            }
            | GattPath::Characteristic {
                adapter, address, ..
            } => Ok(self.adapter(adapter)?.device(*address)?),
            other => Err(anyhow!("{} is not below a device", other)),
        }
    }

    async fn characteristic(&self, path: &GattPath) -> Result<Characteristic> {
        let GattPath::Characteristic {
            service,
            characteristic,
            ..
        } = path
        else {
            bail!("{} is not a characteristic", path);
        };

        let service = self.device(path)?.service(*service).await?;
        Ok(service.characteristic(*characteristic).await?)
    }
}

impl BleBus for BluezBus {
    async fn children(&self, path: &GattPath) -> Result<Vec<GattPath>> {
        let children = match path {
            GattPath::Root => self
                .session
                .adapter_names()
                .await?
                .into_iter()
                .map(|adapter| GattPath::Adapter { adapter })
                .collect(),
            GattPath::Adapter { adapter } => self
                .adapter(adapter)?
                .device_addresses()
                .await?
                .into_iter()
                .filter_map(|address| path.device(address))
                .collect(),
            GattPath::Device { .. } => self
                .device(path)?
                .services()
                .await?
                .iter()
                .filter_map(|service| path.service(service.id()))
                .collect(),
            GattPath::Service { service, .. } => self
                .device(path)?
                .service(*service)
                .await?
                .characteristics()
                .await?
                .iter()
                .filter_map(|characteristic| path.characteristic(characteristic.id()))
                .collect(),
            GattPath::Characteristic { .. } => Vec::new(),
        };
        Ok(children)
    }

    async fn uuid(&self, path: &GattPath) -> Result<Option<Uuid>> {
        match path {
            GattPath::Service { service, .. } => {
                let service = self.device(path)?.service(*service).await?;
                Ok(Some(service.uuid().await?))
            }
            GattPath::Characteristic { .. } => {
                Ok(Some(self.characteristic(path).await?.uuid().await?))
            }
            _ => Ok(None),
        }
    }

    async fn device_address(&self, device: &GattPath) -> Result<Option<Address>> {
        match device {
            GattPath::Device { .. } => Ok(Some(self.device(device)?.address())),
            _ => Ok(None),
        }
    }

    async fn is_connected(&self, device: &GattPath) -> Result<bool> {
        Ok(self.device(device)?.is_connected().await?)
    }

    async fn connect(&self, device: &GattPath) -> Result<()> {
        Ok(self.device(device)?.connect().await?)
    }

    async fn disconnect(&self, device: &GattPath) -> Result<()> {
        Ok(self.device(device)?.disconnect().await?)
    }

    async fn start_discovery(&self, adapter_name: &str) -> Result<()> {
        if self.scans.lock().contains_key(adapter_name) {
            return Ok(());
        }

        let adapter = self.adapter(adapter_name)?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let name = adapter_name.to_string();

        // Discovery stays active for as long as the event stream is held.
        let handle = tokio::spawn(async move {
            let events = match adapter.discover_devices().await {
                Ok(events) => {
                    let _ = ready_tx.send(Ok(()));
                    events
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            pin_mut!(events);

            while let Some(event) = events.next().await {
                if let AdapterEvent::DeviceAdded(address) = event {
                    debug!("Discovered {} on {}", address, name);
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| anyhow!("discovery task on {} exited", adapter_name))??;
        self.scans.lock().insert(adapter_name.to_string(), handle);
        Ok(())
    }

    async fn stop_discovery(&self, adapter_name: &str) -> Result<()> {
        match self.scans.lock().remove(adapter_name) {
            Some(handle) => {
                handle.abort();
                Ok(())
            }
            None => Err(anyhow!("no discovery running on {}", adapter_name)),
        }
    }

    async fn subscribe(
        &self,
        characteristic: &GattPath,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        *self.subscription.lock() = Some(Subscription {
            path: characteristic.clone(),
            tx: sink,
        });
        Ok(())
    }

    async fn start_notify(&self, path: &GattPath) -> Result<()> {
        if let Some(task) = self.notify_task.lock().as_ref() {
            if !task.is_finished() {
                debug!("Notify already running on {}", path);
                return Ok(());
            }
        }

        let tx = match self.subscription.lock().as_ref() {
            Some(subscription) if subscription.path == *path => subscription.tx.clone(),
            _ => bail!("no subscription for {}", path),
        };

        let characteristic = self.characteristic(path).await?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let name = path.to_string();

        let handle = tokio::spawn(async move {
            let values = match characteristic.notify().await {
                Ok(values) => {
                    let _ = ready_tx.send(Ok(()));
                    values
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            pin_mut!(values);

            while let Some(value) = values.next().await {
                if let Err(e) = tx.send(value).await {
                    error!("Failed to queue notification: {}", e);
                    break;
                }
            }
            info!("Notify stream on {} ended", name);
        });

        ready_rx
            .await
            .map_err(|_| anyhow!("notify task on {} exited", path))??;
        *self.notify_task.lock() = Some(handle);
        Ok(())
    }

    async fn stop_notify(&self, path: &GattPath) -> Result<()> {
        match self.notify_task.lock().take() {
            Some(handle) => {
                handle.abort();
                Ok(())
            }
            None => {
                warn!("Notify was not running on {}", path);
                Ok(())
            }
        }
    }

    async fn write_command(&self, path: &GattPath, value: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(path).await?;
        let request = CharacteristicWriteRequest {
            op_type: WriteOp::Command,
            ..Default::default()
        };
        characteristic.write_ext(value, &request).await?;
        Ok(())
    }
}
