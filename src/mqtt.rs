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

//! MQTT broker client: retained state publishing and the off trigger.

use anyhow::Result;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;

/// Capacity of the outgoing request queue inside the client.
const REQUEST_QUEUE: usize = 10;

/// Pending off requests beyond this are coalesced.
const TRIGGER_QUEUE: usize = 4;

/// Trait for state publishing backends.
pub trait StatePublisher {
    /// Publish a state message, retained. Must not block.
    fn publish(&self, payload: &str) -> Result<()>;
}

/// Publishes to the configured state topic.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
}

impl StatePublisher for MqttPublisher {
    fn publish(&self, payload: &str) -> Result<()> {
        debug!("Publishing to {}: {}", self.topic, payload);
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, true, payload.as_bytes().to_vec())?;
        Ok(())
    }
}

/// Start the broker client.
///
/// Returns the publisher and a receiver that yields once per off request. The
/// client's network loop runs in its own task and only ever signals the
/// receiver.
pub fn start(config: &MqttConfig) -> (MqttPublisher, mpsc::Receiver<()>) {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    let (client, eventloop) = AsyncClient::new(options, REQUEST_QUEUE);
    let (off_tx, off_rx) = mpsc::channel(TRIGGER_QUEUE);

    info!("Connecting to MQTT broker at {}:{}", config.host, config.port);
    tokio::spawn(broker_loop(
        eventloop,
        client.clone(),
        config.off_topic.clone(),
        off_tx,
    ));

    let publisher = MqttPublisher {
        client,
        topic: config.state_topic.clone(),
    };
    (publisher, off_rx)
}

/// Drive the client's network loop.
async fn broker_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    off_topic: String,
    off_tx: mpsc::Sender<()>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt: connected");
                // Subscriptions don't survive a clean session; renew on every connect.
                if let Err(e) = client.try_subscribe(&off_topic, QoS::AtLeastOnce) {
                    warn!("mqtt: can't subscribe to {}: {}", off_topic, e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(message))) => {
                info!("mqtt: message received: {}", message.topic);
                if message.topic == off_topic {
                    signal_off(&off_tx);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                info!("mqtt: disconnected");
            }
            Ok(_) => {}
            Err(e) => {
                warn!("mqtt: {}", e);
                // rumqttc reconnects on the next poll
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Wake the event loop for an off request.
fn signal_off(off_tx: &mpsc::Sender<()>) {
    match off_tx.try_send(()) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(())) => debug!("Off request already pending"),
        Err(mpsc::error::TrySendError::Closed(())) => warn!("Off request dropped, event loop gone"),
    }
}
