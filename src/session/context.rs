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

//! Paths the session accumulates.

use crate::bluetooth::topology::ResolvedPaths;
use crate::bluetooth::GattPath;

/// Resolved paths and the subscription flag.
///
/// `paths` are filled once and kept until exit, across reconnects. `device`
/// is re-derived on every cycle.
#[derive(Debug, Default, Clone)]
pub struct SessionContext {
    pub device: Option<GattPath>,
    pub paths: ResolvedPaths,
    /// The notify characteristic is routed into the notification channel.
    pub subscribed: bool,
}

impl SessionContext {
    pub fn is_resolved(&self) -> bool {
        self.paths.is_complete()
    }
}
