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

//! Appliance state as last reported, and its published form.

use anyhow::Result;
use serde::Serialize;

use crate::bluetooth::protocol::QueryReport;

/// Cooking programs, numbered as the appliance reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Program {
    #[default]
    Frying,
    Cereals,
    Multicooker,
    Pilau,
    Steam,
    Baking,
    Stew,
    Soup,
    MilkPorridge,
    Yoghurt,
    Express,
    Warming,
    /// A program byte outside the known table, kept as reported.
    Other(u8),
}

impl Program {
    /// Map a device program byte.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Frying,
            1 => Self::Cereals,
            2 => Self::Multicooker,
            3 => Self::Pilau,
            4 => Self::Steam,
            5 => Self::Baking,
            6 => Self::Stew,
            7 => Self::Soup,
            8 => Self::MilkPorridge,
            9 => Self::Yoghurt,
            10 => Self::Express,
            11 => Self::Warming,
            other => Self::Other(other),
        }
    }

    pub fn label(&self) -> Label {
        Label::Name(match self {
            Self::Frying => "frying",
            Self::Cereals => "cereals",
            Self::Multicooker => "multicooker",
            Self::Pilau => "pilau",
            Self::Steam => "steam",
            Self::Baking => "baking",
            Self::Stew => "stew",
            Self::Soup => "soup",
            Self::MilkPorridge => "milk porridge",
            Self::Yoghurt => "yoghurt",
            Self::Express => "express",
            Self::Warming => "warming",
            Self::Other(code) => return Label::Code(*code),
        })
    }
}

/// Session lifecycle, followed by the operational states the appliance reports.
///
/// Variants are ordered: everything from `Authorized` onwards implies a granted
/// authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LifecycleState {
    #[default]
    Disconnected,
    Connected,
    Authorized,
    Off,
    Setting,
    Delayed,
    Heating,
    Unknown,
    On,
    KeepWarm,
    /// A state byte outside the known table, kept as reported.
    Other(u8),
}

impl LifecycleState {
    /// Map the state byte of a query response.
    pub fn from_device_code(code: u8) -> Self {
        match code {
            0 => Self::Off,
            1 => Self::Setting,
            2 => Self::Delayed,
            3 => Self::Heating,
            4 => Self::Unknown,
            5 => Self::On,
            6 => Self::KeepWarm,
            other => Self::Other(other),
        }
    }

    pub fn is_authorized(&self) -> bool {
        *self >= Self::Authorized
    }

    pub fn label(&self) -> Label {
        Label::Name(match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Authorized => "authorized",
            Self::Off => "off",
            Self::Setting => "setting",
            Self::Delayed => "delayed",
            Self::Heating => "heating",
            Self::Unknown => "unknown",
            Self::On => "on",
            Self::KeepWarm => "keep warm",
            Self::Other(code) => return Label::Code(*code),
        })
    }
}

/// Published form of an enum value: its name, or the raw byte when unnamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Label {
    Name(&'static str),
    Code(u8),
}

/// Last known appliance state plus the outgoing frame counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    /// Tags the next outgoing command; wraps at 256.
    pub counter: u8,
    pub program: Program,
    pub lifecycle: LifecycleState,
    pub temperature: u8,
    pub hours: u8,
    pub minutes: u8,
}

impl DeviceState {
    /// Take the counter for an outgoing frame and advance it.
    pub fn next_counter(&mut self) -> u8 {
        let counter = self.counter;
        self.counter = self.counter.wrapping_add(1);
        counter
    }

    /// Apply a query response as one transition.
    pub fn apply_report(&mut self, report: &QueryReport) {
        self.lifecycle = report.state;
        self.program = report.program;
        self.temperature = report.temperature;
        self.hours = report.hours;
        self.minutes = report.minutes;
    }

    /// Drop back to `Connected`, clearing everything the appliance reported.
    /// The counter is kept so frames stay uniquely tagged on this connection.
    pub fn revoke_authorization(&mut self) {
        *self = Self {
            counter: self.counter,
            lifecycle: LifecycleState::Connected,
            ..Self::default()
        };
    }

    /// Serialize for the state topic.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&StateMessage::from(self))?)
    }
}

/// Body published on the state topic.
#[derive(Debug, Serialize)]
struct StateMessage {
    state: Label,
    program: Label,
    temperature: u8,
    hours: u8,
    minutes: u8,
}

impl From<&DeviceState> for StateMessage {
    fn from(state: &DeviceState) -> Self {
        Self {
            state: state.lifecycle.label(),
            program: state.program.label(),
            temperature: state.temperature,
            hours: state.hours,
            minutes: state.minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_wraps() {
        let mut state = DeviceState {
            counter: 255,
            ..Default::default()
        };
        assert_eq!(state.next_counter(), 255);
        assert_eq!(state.counter, 0);
        assert_eq!(state.next_counter(), 0);
        assert_eq!(state.counter, 1);
    }

    #[test]
    fn test_json_uses_spaced_lowercase_names() {
        let state = DeviceState {
            counter: 9,
            program: Program::MilkPorridge,
            lifecycle: LifecycleState::KeepWarm,
            temperature: 40,
            hours: 1,
            minutes: 30,
        };
        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();

        assert_eq!(json["state"], "keep warm");
        assert_eq!(json["program"], "milk porridge");
        assert_eq!(json["temperature"], 40);
        assert_eq!(json["hours"], 1);
        assert_eq!(json["minutes"], 30);
        assert!(json.get("counter").is_none());
    }

    #[test]
    fn test_authorization_ordering() {
        assert!(!LifecycleState::Disconnected.is_authorized());
        assert!(!LifecycleState::Connected.is_authorized());
        assert!(LifecycleState::Authorized.is_authorized());
        assert!(LifecycleState::Off.is_authorized());
        assert!(LifecycleState::KeepWarm.is_authorized());
    }

    #[test]
    fn test_revoke_keeps_counter_only() {
        let mut state = DeviceState {
            counter: 7,
            program: Program::Soup,
            lifecycle: LifecycleState::Heating,
            temperature: 90,
            hours: 2,
            minutes: 5,
        };
        state.revoke_authorization();

        assert_eq!(
            state,
            DeviceState {
                counter: 7,
                lifecycle: LifecycleState::Connected,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_device_codes() {
        assert_eq!(LifecycleState::from_device_code(5), LifecycleState::On);
        assert_eq!(LifecycleState::from_device_code(7), LifecycleState::Other(7));
        assert_eq!(Program::from_code(3), Program::Pilau);
        assert_eq!(Program::from_code(12), Program::Other(12));
    }

    #[test]
    fn test_unnamed_bytes_publish_as_numbers() {
        let state = DeviceState {
            counter: 2,
            program: Program::Other(14),
            lifecycle: LifecycleState::Other(9),
            temperature: 70,
            hours: 0,
            minutes: 12,
        };
        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();

        assert_eq!(json["state"], 9);
        assert_eq!(json["program"], 14);
        assert_eq!(json["temperature"], 70);
        assert!(state.lifecycle.is_authorized());
    }
}
