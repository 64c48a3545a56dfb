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

//! Command frame encoding and notification decoding.
//!
//! Every frame is `[0x55, counter, code, payload.., 0xAA]`. Responses are
//! read by fixed offset, always through [`ResponseFrame`] so no offset is
//! touched without a length check.

use thiserror::Error;

use super::ble_constants::{code, frame, query_offset, AUTH_GRANTED_OFFSET};
use crate::state::{LifecycleState, Program};

/// Commands the host can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Authorize with the 8-byte key.
    Auth([u8; 8]),
    /// Ask for the current program and state.
    Query,
    /// Switch the appliance off.
    Off,
}

impl Command {
    pub fn code(&self) -> u8 {
        match self {
            Self::Auth(_) => code::AUTH,
            Self::Query => code::QUERY,
            Self::Off => code::OFF,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Auth(_) => "authorization request",
            Self::Query => "query",
            Self::Off => "turnoff",
        }
    }

    /// Build the frame tagged with `counter`.
    pub fn encode(&self, counter: u8) -> Vec<u8> {
        let payload: &[u8] = match self {
            Self::Auth(key) => key,
            Self::Query | Self::Off => &[],
        };

        let mut bytes = Vec::with_capacity(frame::MIN_LEN + payload.len());
        bytes.push(frame::START);
        bytes.push(counter);
        bytes.push(self.code());
        bytes.extend_from_slice(payload);
        bytes.push(frame::END);
        bytes
    }
}

pub fn encode_auth(counter: u8, key: &[u8; 8]) -> Vec<u8> {
    Command::Auth(*key).encode(counter)
}

pub fn encode_query(counter: u8) -> Vec<u8> {
    Command::Query.encode(counter)
}

pub fn encode_off(counter: u8) -> Vec<u8> {
    Command::Off.encode(counter)
}

/// Reasons a notification payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("value too short: {len} bytes, need {required}")]
    TooShort { len: usize, required: usize },
    #[error("unknown command code 0x{0:02x}")]
    UnknownCode(u8),
}

/// Fields of a query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryReport {
    pub program: Program,
    pub temperature: u8,
    pub hours: u8,
    pub minutes: u8,
    pub state: LifecycleState,
}

/// A decoded notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    AuthResult { granted: bool },
    QueryResult(QueryReport),
}

/// Bounds-checked view over a response payload.
#[derive(Debug, Clone, Copy)]
pub struct ResponseFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> ResponseFrame<'a> {
    /// Wrap `bytes`, requiring at least the fixed header.
    pub fn new(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let response = Self { bytes };
        response.require(frame::MIN_LEN)?;
        Ok(response)
    }

    pub fn code(&self) -> u8 {
        self.bytes[2]
    }

    /// Byte at `offset`, or `TooShort` naming the length that would satisfy it.
    pub fn byte(&self, offset: usize) -> Result<u8, DecodeError> {
        self.bytes.get(offset).copied().ok_or(DecodeError::TooShort {
            len: self.bytes.len(),
            required: offset + 1,
        })
    }

    fn require(&self, required: usize) -> Result<(), DecodeError> {
        if self.bytes.len() < required {
            return Err(DecodeError::TooShort {
                len: self.bytes.len(),
                required,
            });
        }
        Ok(())
    }
}

/// Decode a value pushed on the notify characteristic.
pub fn decode(bytes: &[u8]) -> Result<Notification, DecodeError> {
    let response = ResponseFrame::new(bytes)?;

    match response.code() {
        code::AUTH => Ok(Notification::AuthResult {
            granted: response.byte(AUTH_GRANTED_OFFSET)? != 0,
        }),
        code::QUERY => {
            response.require(frame::QUERY_RESPONSE_LEN)?;

            Ok(Notification::QueryResult(QueryReport {
                program: Program::from_code(response.byte(query_offset::PROGRAM)?),
                temperature: response.byte(query_offset::TEMPERATURE)?,
                hours: response.byte(query_offset::HOURS)?,
                minutes: response.byte(query_offset::MINUTES)?,
                state: LifecycleState::from_device_code(response.byte(query_offset::STATE)?),
            }))
        }
        other => Err(DecodeError::UnknownCode(other)),
    }
}
