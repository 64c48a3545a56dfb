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

//! BLE characteristic UUIDs and wire constants for the M223S multicooker.

use uuid::Uuid;

/// Write characteristic UUID (host writes command frames here).
/// Properties: Write, Write Without Response
pub const WRITE_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Notify characteristic UUID (appliance pushes response frames here).
/// Properties: Notify
pub const NOTIFY_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Bluetooth address of the paired appliance.
pub const DEFAULT_ADDRESS: &str = "F9:DA:73:71:23:4A";

/// Authorization key sent with every auth frame.
pub const DEFAULT_AUTH_KEY: [u8; 8] = [0xa4, 0x3b, 0x64, 0xb0, 0xa3, 0xfb, 0xae, 0xcb];

/// Frame delimiters.
pub mod frame {
    pub const START: u8 = 0x55;
    pub const END: u8 = 0xAA;

    /// Start, counter, code and terminator.
    pub const MIN_LEN: usize = 4;

    /// A query response carries its state byte at offset 11 and is padded to 20.
    pub const QUERY_RESPONSE_LEN: usize = 20;
}

/// Command codes (byte 2 of every frame).
pub mod code {
    pub const AUTH: u8 = 0xFF;
    pub const QUERY: u8 = 0x06;
    pub const OFF: u8 = 0x04;
}

/// Byte offsets inside a query response.
pub mod query_offset {
    pub const PROGRAM: usize = 3;
    pub const TEMPERATURE: usize = 5;
    pub const HOURS: usize = 8;
    pub const MINUTES: usize = 9;
    pub const STATE: usize = 11;
}

/// Auth response offset of the granted flag.
pub const AUTH_GRANTED_OFFSET: usize = 3;
