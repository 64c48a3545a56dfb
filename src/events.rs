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

//! Event processing and dispatch.
//!
//! Poll ticks, appliance notifications and off requests are all served from
//! one task. A cycle in progress is just another branch of the loop, so an
//! off request or a notification is handled while the cycle waits on the
//! bus. Cycles never overlap each other.

use futures::future::{Fuse, FusedFuture, FutureExt};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bluetooth::BleBus;
use crate::config::TimingConfig;
use crate::mqtt::StatePublisher;
use crate::session::Session;

/// Whether a connection has been polled long enough to drop it.
///
/// The counter advances once per command, so it approximates how many poll
/// intervals have passed on this connection.
pub fn unattended_too_long(counter: u8, interval: Duration, ceiling: Duration) -> bool {
    interval * u32::from(counter) >= ceiling
}

/// Drives the session from the polling timer, notifications and off requests.
pub struct EventLoop<B, P> {
    session: Session<B, P>,
    notifications: mpsc::Receiver<Vec<u8>>,
    off_rx: mpsc::Receiver<()>,
    polling_interval: Duration,
    idle_ceiling: Duration,
}

impl<B: BleBus, P: StatePublisher> EventLoop<B, P> {
    pub fn new(
        session: Session<B, P>,
        notifications: mpsc::Receiver<Vec<u8>>,
        off_rx: mpsc::Receiver<()>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            session,
            notifications,
            off_rx,
            polling_interval: timing.polling_interval(),
            idle_ceiling: timing.idle_disconnect(),
        }
    }

    pub fn session(&self) -> &Session<B, P> {
        &self.session
    }

    /// Run until `shutdown` resolves. The first cycle starts immediately.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let Self {
            session,
            notifications,
            off_rx,
            polling_interval,
            idle_ceiling,
        } = self;
        let session = &*session;

        let cycle = Fuse::terminated();
        tokio::pin!(cycle);

        let mut off_open = true;
        loop {
            tokio::select! {
                _ = ticker.tick(), if cycle.is_terminated() => {
                    cycle.set(poll_once(session, *polling_interval, *idle_ceiling).fuse());
                }
                () = &mut cycle => {
                    debug!("Cycle finished");
                }
                Some(value) = notifications.recv() => {
                    session.handle_notification(&value).await;
                }
                request = off_rx.recv(), if off_open => {
                    match request {
                        Some(()) => turn_off(session).await,
                        None => {
                            warn!("Off requests channel closed");
                            off_open = false;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }

    /// One poll run to completion, without serving anything else.
    pub async fn on_tick(&self) {
        poll_once(&self.session, self.polling_interval, self.idle_ceiling).await;
    }
}

/// One poll: drop a long-lived connection first, then run a cycle.
async fn poll_once<B: BleBus, P: StatePublisher>(
    session: &Session<B, P>,
    polling_interval: Duration,
    idle_ceiling: Duration,
) {
    if unattended_too_long(session.state().counter, polling_interval, idle_ceiling) {
        info!("Connection polled for too long, reconnecting");
        session.disconnect().await;
    }

    if let Err(e) = session.run_cycle().await {
        warn!("Update failed: {}", e);
    }
}

async fn turn_off<B: BleBus, P: StatePublisher>(session: &Session<B, P>) {
    info!("Off requested");
    if let Err(e) = session.turn_off().await {
        warn!("Turnoff failed: {}", e);
    }
}
