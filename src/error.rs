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

//! Session error taxonomy.
//!
//! Only `BusUnavailable` ends the process. Everything else aborts the current
//! cycle (or drops one notification) and is retried by the next poll.

use bluer::Address;
use std::time::Duration;
use thiserror::Error;

use crate::bluetooth::protocol::DecodeError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Bluetooth bus unavailable: {0:#}")]
    BusUnavailable(anyhow::Error),

    #[error("device {0} not found")]
    DeviceNotFound(Address),

    #[error("can't connect: {0:#}")]
    ConnectFailed(anyhow::Error),

    #[error("write/notify characteristics not discovered yet")]
    ResolveFailed,

    #[error("write not acknowledged within {0:?}")]
    WriteTimeout(Duration),

    #[error("write failed: {0:#}")]
    WriteFailed(anyhow::Error),

    #[error("malformed notification: {0}")]
    MalformedNotification(#[from] DecodeError),

    #[error("publish failed: {0:#}")]
    PublishFailed(anyhow::Error),
}
