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

//! Appliance session: connection, authorization and state tracking.
//!
//! A cycle runs Locate → Connect → Resolve → Authorize → Query and returns
//! as soon as it has issued the next command. Answers arrive later as
//! notifications and are applied by [`Session::handle_notification`], which
//! always acts on the current state rather than on anything the cycle saw.
//!
//! All operations take `&self`, so an off request or a notification can be
//! served while a cycle is suspended on the bus. State and paths sit behind
//! short-lived locks that are never held across an await.

mod context;

pub use context::SessionContext;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bluetooth::protocol::{self, Command, Notification};
use crate::bluetooth::{topology, BleBus, DeviceLocator, GattPath, WritePipeline};
use crate::config::{DeviceProfile, TimingConfig};
use crate::error::SessionError;
use crate::mqtt::StatePublisher;
use crate::state::{DeviceState, LifecycleState};

/// Capacity of the notification channel.
const NOTIFY_QUEUE: usize = 32;

/// Channel carrying values pushed on the notify characteristic.
pub fn notification_channel() -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
    mpsc::channel(NOTIFY_QUEUE)
}

/// Session with the one appliance.
pub struct Session<B, P> {
    bus: B,
    publisher: P,
    profile: DeviceProfile,
    locator: DeviceLocator,
    pipeline: WritePipeline,
    notifications: mpsc::Sender<Vec<u8>>,
    context: Mutex<SessionContext>,
    state: Mutex<DeviceState>,
}

impl<B: BleBus, P: StatePublisher> Session<B, P> {
    /// Values pushed by the appliance are routed into `notifications` once
    /// the notify characteristic is known.
    pub fn new(
        bus: B,
        publisher: P,
        profile: DeviceProfile,
        timing: &TimingConfig,
        notifications: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        Self {
            bus,
            publisher,
            profile,
            locator: DeviceLocator::new(
                profile.address,
                timing.locate_rounds,
                timing.locate_round_delay(),
                timing.discovery_cooldown(),
            ),
            pipeline: WritePipeline::new(timing.write_timeout(), timing.settle_delay()),
            notifications,
            context: Mutex::new(SessionContext::default()),
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> DeviceState {
        self.state.lock().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.context.lock().is_resolved()
    }

    /// Run one polling cycle up to the next command sent.
    pub async fn run_cycle(&self) -> Result<(), SessionError> {
        info!("Updating M223S state");

        let device = self.locator.locate(&self.bus).await?;
        self.context.lock().device = Some(device.clone());

        self.ensure_connected(&device).await?;
        self.ensure_resolved(&device).await?;

        if !self.state.lock().lifecycle.is_authorized() {
            // The query follows once the grant is notified.
            return self.authorize().await;
        }

        info!("Ready");
        self.send(Command::Query).await
    }

    /// Switch the appliance off, outside the polling schedule.
    pub async fn turn_off(&self) -> Result<(), SessionError> {
        self.send(Command::Off).await
    }

    /// Stop notifications and drop the connection.
    pub async fn disconnect(&self) {
        let (device, notify) = {
            let context = self.context.lock();
            (context.device.clone(), context.paths.notify.clone())
        };
        let Some(device) = device else {
            debug!("No device to disconnect");
            return;
        };

        if let Some(notify) = notify {
            info!("Stopping notify on {}", notify);
            match self.bus.stop_notify(&notify).await {
                Ok(()) => info!("Stopped notify"),
                Err(e) => warn!("Can't stop notify: {:#}", e),
            }
        }

        info!("Disconnecting...");
        match self.bus.disconnect(&device).await {
            Ok(()) => info!("Disconnected"),
            Err(e) => warn!("Can't disconnect: {:#}", e),
        }

        self.update_state(|state| *state = DeviceState::default());
    }

    /// Apply a value pushed by the appliance.
    pub async fn handle_notification(&self, value: &[u8]) {
        debug!("New value: {}", hex::encode(value));

        let notification = match protocol::decode(value) {
            Ok(notification) => notification,
            Err(e) => {
                warn!("{}", SessionError::from(e));
                return;
            }
        };

        match notification {
            Notification::AuthResult { granted: true } => {
                let newly_granted = self.update_state(|state| {
                    let newly_granted = !state.lifecycle.is_authorized();
                    state.lifecycle = LifecycleState::Authorized;
                    newly_granted
                });

                if newly_granted {
                    info!("Ready");
                    if let Err(e) = self.send(Command::Query).await {
                        warn!("Query after authorization failed: {}", e);
                    }
                }
            }
            Notification::AuthResult { granted: false } => {
                warn!("Authorization refused");
                self.update_state(DeviceState::revoke_authorization);
            }
            Notification::QueryResult(report) => {
                self.update_state(|state| state.apply_report(&report));
            }
        }
    }

    async fn ensure_connected(&self, device: &GattPath) -> Result<(), SessionError> {
        match self.bus.is_connected(device).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => debug!("Can't read connection status of {}: {:#}", device, e),
        }

        self.update_state(|state| *state = DeviceState::default());

        info!("Connecting...");
        self.bus
            .connect(device)
            .await
            .map_err(SessionError::ConnectFailed)?;

        info!("Connected");
        self.update_state(|state| state.lifecycle = LifecycleState::Connected);
        Ok(())
    }

    async fn ensure_resolved(&self, device: &GattPath) -> Result<(), SessionError> {
        let known = self.context.lock().paths.clone();
        let paths = topology::resolve(&self.bus, device, &self.profile.uuids, known).await;

        let (notify, subscribed) = {
            let mut context = self.context.lock();
            context.paths = paths;
            (context.paths.notify.clone(), context.subscribed)
        };

        if let (Some(notify), false) = (notify, subscribed) {
            match self.bus.subscribe(&notify, self.notifications.clone()).await {
                Ok(()) => {
                    info!("Initialized notify subscription on {}", notify);
                    self.context.lock().subscribed = true;
                }
                Err(e) => warn!("Failed to initialize notify subscription: {:#}", e),
            }
        }

        if self.context.lock().is_resolved() {
            Ok(())
        } else {
            Err(SessionError::ResolveFailed)
        }
    }

    async fn authorize(&self) -> Result<(), SessionError> {
        let notify = self.context.lock().paths.notify.clone();
        if let Some(notify) = notify {
            info!("Starting notify on {}", notify);
            if let Err(e) = self.bus.start_notify(&notify).await {
                warn!("Can't start notify on {}: {:#}", notify, e);
            }
        }

        self.send(Command::Auth(self.profile.auth_key)).await
    }

    /// Tag `command` with the current counter, advance it, and write it.
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        let path = self
            .context
            .lock()
            .paths
            .write
            .clone()
            .ok_or(SessionError::ResolveFailed)?;

        info!("Sending {}", command.name());
        let frame = command.encode(self.state.lock().next_counter());
        self.pipeline.write(&self.bus, &path, &frame).await?;
        info!("Sent {}", command.name());
        Ok(())
    }

    /// The only place state changes; every change is republished.
    fn update_state<R>(&self, change: impl FnOnce(&mut DeviceState) -> R) -> R {
        let (result, payload) = {
            let mut state = self.state.lock();
            let result = change(&mut state);
            (result, state.to_json())
        };

        if let Err(e) = payload.and_then(|payload| self.publisher.publish(&payload)) {
            warn!("{}", SessionError::PublishFailed(e));
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn set_counter(&self, counter: u8) {
        self.state.lock().counter = counter;
    }
}
