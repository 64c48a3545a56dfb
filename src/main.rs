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

//! M223S MQTT bridge

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m223s_bridge::bluetooth::BluezBus;
use m223s_bridge::config::Config;
use m223s_bridge::error::SessionError;
use m223s_bridge::events::EventLoop;
use m223s_bridge::mqtt;
use m223s_bridge::session::{self, Session};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("m223s_bridge=info".parse()?),
        )
        .init();

    info!("Starting M223S bridge v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    let profile = config.device.profile()?;
    info!("Configuration loaded, appliance {}", profile.address);

    // Without the system bus there is nothing to retry.
    let bus = BluezBus::new().await.map_err(SessionError::BusUnavailable)?;

    let (publisher, off_rx) = mqtt::start(&config.mqtt);

    let (notify_tx, notify_rx) = session::notification_channel();
    let session = Session::new(bus, publisher, profile, &config.timing, notify_tx);
    let mut events = EventLoop::new(session, notify_rx, off_rx, &config.timing);

    info!("Ready. Polling every {:?}", config.timing.polling_interval());
    events
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Can't listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("M223S bridge stopped");
    Ok(())
}
