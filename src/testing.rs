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

//! Scripted bus and recording publisher for unit tests.

use anyhow::{anyhow, Result};
use bluer::Address;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bluetooth::ble_constants::{
    code, DEFAULT_ADDRESS, DEFAULT_AUTH_KEY, NOTIFY_UUID, WRITE_UUID,
};
use crate::bluetooth::{BleBus, CharacteristicUuids, GattPath};
use crate::config::DeviceProfile;
use crate::mqtt::StatePublisher;

const ADAPTER: &str = "hci0";
const SERVICE: u16 = 0x000c;
const WRITE_CHAR: u16 = 0x000d;
const NOTIFY_CHAR: u16 = 0x000f;

#[derive(Default)]
struct MockState {
    children: HashMap<GattPath, Vec<GattPath>>,
    uuids: HashMap<GattPath, Uuid>,

    hidden_until_scan: bool,
    connected: bool,
    fail_connect: bool,
    fail_discovery: bool,
    hang_writes: bool,
    fail_writes: bool,

    adapter_listings: usize,
    uuid_reads: usize,
    connects: usize,
    disconnects: usize,
    discovery_starts: usize,
    discovery_stops: usize,
    subscribe_calls: usize,
    notify_starts: usize,
    notify_stops: usize,

    writes: Vec<(GattPath, Vec<u8>)>,
    subscriber: Option<mpsc::Sender<Vec<u8>>>,
}

/// In-memory object tree standing in for BlueZ.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    /// One adapter with the appliance, connected, exposing both characteristics.
    pub fn with_appliance() -> Self {
        let bus = Self::empty_adapter();
        bus.restore_appliance();
        bus.state.lock().connected = true;
        bus
    }

    /// One adapter and no devices.
    pub fn empty_adapter() -> Self {
        let bus = Self::no_adapters();
        bus.add_adapter();
        bus
    }

    /// A stack with no adapter at all.
    pub fn no_adapters() -> Self {
        Self::default()
    }

    pub fn add_adapter(&self) {
        self.add_node(&GattPath::Root, adapter(), None);
    }

    pub fn appliance_address(&self) -> Address {
        DEFAULT_ADDRESS.parse().unwrap()
    }

    pub fn appliance_path(&self) -> GattPath {
        adapter().device(self.appliance_address()).unwrap()
    }

    pub fn write_path(&self) -> GattPath {
        self.service_path().characteristic(WRITE_CHAR).unwrap()
    }

    pub fn notify_path(&self) -> GattPath {
        self.service_path().characteristic(NOTIFY_CHAR).unwrap()
    }

    fn service_path(&self) -> GattPath {
        self.appliance_path().service(SERVICE).unwrap()
    }

    /// Append `child` under `parent`.
    pub fn add_node(&self, parent: &GattPath, child: GattPath, uuid: Option<Uuid>) {
        let mut state = self.state.lock();
        state
            .children
            .entry(parent.clone())
            .or_default()
            .push(child.clone());
        if let Some(uuid) = uuid {
            state.uuids.insert(child, uuid);
        }
    }

    /// Remove `path` and its subtree.
    pub fn remove_node(&self, path: &GattPath) {
        let mut state = self.state.lock();
        for children in state.children.values_mut() {
            children.retain(|child| child != path);
        }

        let mut pending = vec![path.clone()];
        while let Some(node) = pending.pop() {
            state.uuids.remove(&node);
            if let Some(children) = state.children.remove(&node) {
                pending.extend(children);
            }
        }
    }

    /// Put the appliance subtree back in its initial shape.
    pub fn restore_appliance(&self) {
        let device = self.appliance_path();
        self.remove_node(&device);

        let service = self.service_path();
        self.add_node(&adapter(), device.clone(), None);
        self.add_node(&device, service.clone(), None);
        self.add_node(&service, self.write_path(), Some(WRITE_UUID));
        self.add_node(&service, self.notify_path(), Some(NOTIFY_UUID));
    }

    pub fn hide_appliance_until_scan(&self) {
        self.state.lock().hidden_until_scan = true;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    pub fn fail_connect(&self) {
        self.state.lock().fail_connect = true;
    }

    pub fn fail_discovery(&self) {
        self.state.lock().fail_discovery = true;
    }

    pub fn hang_writes(&self) {
        self.state.lock().hang_writes = true;
    }

    /// Writes issued from now on complete; ones already hanging stay so.
    pub fn release_writes(&self) {
        self.state.lock().hang_writes = false;
    }

    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Push a value on the open subscription.
    pub fn notify(&self, value: Vec<u8>) {
        let state = self.state.lock();
        let subscriber = state.subscriber.as_ref().expect("no subscription open");
        subscriber.try_send(value).expect("subscription full");
    }

    pub fn writes(&self) -> Vec<(GattPath, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    pub fn adapter_listings(&self) -> usize {
        self.state.lock().adapter_listings
    }

    pub fn uuid_reads(&self) -> usize {
        self.state.lock().uuid_reads
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    pub fn discovery_starts(&self) -> usize {
        self.state.lock().discovery_starts
    }

    pub fn discovery_stops(&self) -> usize {
        self.state.lock().discovery_stops
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    pub fn notify_starts(&self) -> usize {
        self.state.lock().notify_starts
    }

    pub fn notify_stops(&self) -> usize {
        self.state.lock().notify_stops
    }
}

impl BleBus for MockBus {
    async fn children(&self, path: &GattPath) -> Result<Vec<GattPath>> {
        let mut state = self.state.lock();
        if *path == GattPath::Root {
            state.adapter_listings += 1;
        }

        let mut children = state.children.get(path).cloned().unwrap_or_default();
        if state.hidden_until_scan {
            children.retain(|child| !matches!(child, GattPath::Device { .. }));
        }
        Ok(children)
    }

    async fn uuid(&self, path: &GattPath) -> Result<Option<Uuid>> {
        let mut state = self.state.lock();
        state.uuid_reads += 1;
        Ok(state.uuids.get(path).copied())
    }

    async fn device_address(&self, device: &GattPath) -> Result<Option<Address>> {
        match device {
            GattPath::Device { address, .. } => Ok(Some(*address)),
            _ => Ok(None),
        }
    }

    async fn is_connected(&self, _device: &GattPath) -> Result<bool> {
        Ok(self.state.lock().connected)
    }

    async fn connect(&self, _device: &GattPath) -> Result<()> {
        let mut state = self.state.lock();
        state.connects += 1;
        if state.fail_connect {
            return Err(anyhow!("page timeout"));
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self, _device: &GattPath) -> Result<()> {
        let mut state = self.state.lock();
        state.disconnects += 1;
        state.connected = false;
        Ok(())
    }

    async fn start_discovery(&self, _adapter: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_discovery {
            return Err(anyhow!("adapter busy"));
        }
        state.discovery_starts += 1;
        state.hidden_until_scan = false;
        Ok(())
    }

    async fn stop_discovery(&self, _adapter: &str) -> Result<()> {
        self.state.lock().discovery_stops += 1;
        Ok(())
    }

    async fn subscribe(
        &self,
        _characteristic: &GattPath,
        sink: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.subscribe_calls += 1;
        state.subscriber = Some(sink);
        Ok(())
    }

    async fn start_notify(&self, _characteristic: &GattPath) -> Result<()> {
        self.state.lock().notify_starts += 1;
        Ok(())
    }

    async fn stop_notify(&self, _characteristic: &GattPath) -> Result<()> {
        self.state.lock().notify_stops += 1;
        Ok(())
    }

    async fn write_command(&self, characteristic: &GattPath, value: &[u8]) -> Result<()> {
        let hang = {
            let mut state = self.state.lock();
            if state.fail_writes {
                return Err(anyhow!("not permitted"));
            }
            state.hang_writes
        };
        if hang {
            std::future::pending::<()>().await;
        }

        self.state
            .lock()
            .writes
            .push((characteristic.clone(), value.to_vec()));
        Ok(())
    }
}

fn adapter() -> GattPath {
    GattPath::Adapter {
        adapter: ADAPTER.to_string(),
    }
}

/// Profile matching the tree of [`MockBus::with_appliance`].
pub fn test_profile(bus: &MockBus) -> DeviceProfile {
    DeviceProfile {
        address: bus.appliance_address(),
        auth_key: DEFAULT_AUTH_KEY,
        uuids: CharacteristicUuids {
            write: WRITE_UUID,
            notify: NOTIFY_UUID,
        },
    }
}

/// A 20-byte query response.
pub fn query_response(program: u8, temperature: u8, hours: u8, minutes: u8, state: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; 20];
    bytes[0] = 0x55;
    bytes[2] = code::QUERY;
    bytes[3] = program;
    bytes[5] = temperature;
    bytes[8] = hours;
    bytes[9] = minutes;
    bytes[11] = state;
    bytes[19] = 0xAA;
    bytes
}

/// Keeps every payload it is asked to publish.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    messages: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingPublisher {
    /// Reject every publish from now on.
    pub fn fail(&self) {
        *self.failing.lock() = true;
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// The `state` field of every message, in order.
    pub fn states(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| {
                let json: serde_json::Value = serde_json::from_str(m).unwrap();
                json["state"].as_str().unwrap().to_string()
            })
            .collect()
    }

    pub fn last_json(&self) -> Option<serde_json::Value> {
        self.messages()
            .last()
            .map(|m| serde_json::from_str(m).unwrap())
    }
}

impl StatePublisher for RecordingPublisher {
    fn publish(&self, payload: &str) -> Result<()> {
        if *self.failing.lock() {
            return Err(anyhow!("broker unreachable"));
        }
        self.messages.lock().push(payload.to_string());
        Ok(())
    }
}
