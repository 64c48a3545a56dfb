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

//! Maps the write and notify characteristics to object paths.

use tracing::{debug, warn};
use uuid::Uuid;

use super::bus::{BleBus, GattPath};

/// UUIDs identifying the two characteristics the session needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicUuids {
    pub write: Uuid,
    pub notify: Uuid,
}

/// Paths of the two characteristics, as far as they are known.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub write: Option<GattPath>,
    pub notify: Option<GattPath>,
}

impl ResolvedPaths {
    pub fn is_complete(&self) -> bool {
        self.write.is_some() && self.notify.is_some()
    }
}

/// Fill in whichever of `known`'s paths are still missing from `device`'s
/// subtree. Paths already known are never replaced; once both are known no
/// walk happens.
pub async fn resolve<B: BleBus>(
    bus: &B,
    device: &GattPath,
    uuids: &CharacteristicUuids,
    known: ResolvedPaths,
) -> ResolvedPaths {
    if known.is_complete() {
        debug!("Paths already resolved");
        return known;
    }

    let found = walk(bus, device, uuids).await;
    ResolvedPaths {
        write: known.write.or(found.write),
        notify: known.notify.or(found.notify),
    }
}

/// Depth-first walk, node before children, children in listed order.
///
/// Visits every node; the first match for each role wins.
pub async fn walk<B: BleBus>(
    bus: &B,
    root: &GattPath,
    uuids: &CharacteristicUuids,
) -> ResolvedPaths {
    let mut found = ResolvedPaths::default();
    let mut pending = vec![root.clone()];

    while let Some(node) = pending.pop() {
        match bus.uuid(&node).await {
            Ok(Some(uuid)) if uuid == uuids.write => {
                if found.write.is_none() {
                    debug!("Write characteristic at {}", node);
                    found.write = Some(node.clone());
                }
            }
            Ok(Some(uuid)) if uuid == uuids.notify => {
                if found.notify.is_none() {
                    debug!("Notify characteristic at {}", node);
                    found.notify = Some(node.clone());
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Can't read UUID of {}: {:#}", node, e),
        }

        match bus.children(&node).await {
            Ok(children) => pending.extend(children.into_iter().rev()),
            Err(e) => warn!("Can't enumerate nodes under {}: {:#}", node, e),
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::ble_constants::{NOTIFY_UUID, WRITE_UUID};
    use crate::testing::MockBus;

    const UUIDS: CharacteristicUuids = CharacteristicUuids {
        write: WRITE_UUID,
        notify: NOTIFY_UUID,
    };

    #[tokio::test]
    async fn test_resolves_both_paths() {
        let bus = MockBus::with_appliance();
        let device = bus.appliance_path();

        let paths = resolve(&bus, &device, &UUIDS, ResolvedPaths::default()).await;

        assert_eq!(paths.write, Some(bus.write_path()));
        assert_eq!(paths.notify, Some(bus.notify_path()));
        assert!(paths.is_complete());
    }

    #[tokio::test]
    async fn test_first_match_in_walk_order_wins() {
        let bus = MockBus::with_appliance();
        let device = bus.appliance_path();
        let service = device.service(0x0020).unwrap();
        let duplicate = service.characteristic(0x0021).unwrap();
        bus.add_node(&device, service.clone(), None);
        bus.add_node(&service, duplicate.clone(), Some(WRITE_UUID));

        let found = walk(&bus, &device, &UUIDS).await;

        assert_eq!(found.write, Some(bus.write_path()));
        assert_ne!(found.write, Some(duplicate));
    }

    #[tokio::test]
    async fn test_complete_paths_skip_the_walk() {
        let bus = MockBus::with_appliance();
        let device = bus.appliance_path();

        let paths = resolve(&bus, &device, &UUIDS, ResolvedPaths::default()).await;
        let walks = bus.uuid_reads();
        let again = resolve(&bus, &device, &UUIDS, paths.clone()).await;

        assert_eq!(bus.uuid_reads(), walks);
        assert_eq!(again, paths);
    }

    #[tokio::test]
    async fn test_missing_write_characteristic_is_filled_later() {
        let bus = MockBus::with_appliance();
        bus.remove_node(&bus.write_path());
        let device = bus.appliance_path();

        let partial = resolve(&bus, &device, &UUIDS, ResolvedPaths::default()).await;
        assert!(partial.write.is_none());
        assert_eq!(partial.notify, Some(bus.notify_path()));

        bus.restore_appliance();
        let paths = resolve(&bus, &device, &UUIDS, partial).await;
        assert!(paths.is_complete());
    }

    #[tokio::test]
    async fn test_known_path_is_never_replaced() {
        let bus = MockBus::with_appliance();
        let device = bus.appliance_path();
        let earlier = device.service(0x0001).unwrap().characteristic(0x0002).unwrap();
        let known = ResolvedPaths {
            write: Some(earlier.clone()),
            notify: None,
        };

        let paths = resolve(&bus, &device, &UUIDS, known).await;

        assert_eq!(paths.write, Some(earlier));
        assert_eq!(paths.notify, Some(bus.notify_path()));
    }
}
