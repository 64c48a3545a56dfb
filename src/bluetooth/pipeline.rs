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

//! Timed command writes.

use std::time::Duration;
use tracing::debug;

use super::bus::{BleBus, GattPath};
use crate::error::SessionError;

/// Sends one frame, waits for the acknowledgment, then lets the appliance settle.
///
/// Writes are not serialized. An off command can go out while a cycle's
/// write is still waiting for its acknowledgment.
#[derive(Debug, Clone, Copy)]
pub struct WritePipeline {
    timeout: Duration,
    settle: Duration,
}

impl WritePipeline {
    pub fn new(timeout: Duration, settle: Duration) -> Self {
        Self { timeout, settle }
    }

    /// Write `frame` and resolve once acknowledged and settled.
    ///
    /// On timeout the bus call is abandoned, not cancelled, and no settle
    /// delay is applied.
    pub async fn write<B: BleBus>(
        &self,
        bus: &B,
        path: &GattPath,
        frame: &[u8],
    ) -> Result<(), SessionError> {
        debug!("Writing {} to {}", hex::encode(frame), path);

        match tokio::time::timeout(self.timeout, bus.write_command(path, frame)).await {
            Err(_) => Err(SessionError::WriteTimeout(self.timeout)),
            Ok(Err(e)) => Err(SessionError::WriteFailed(e)),
            Ok(Ok(())) => {
                tokio::time::sleep(self.settle).await;
                Ok(())
            }
        }
    }
}
