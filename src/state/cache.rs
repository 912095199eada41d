// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity cache of one controller session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::action::Action;
use super::location::{Location, Locations};
use super::meter::Meter;
use super::system_info::SystemInfo;
use super::thermostat::Thermostat;

/// Entities keyed by their protocol id.
///
/// Entities are only ever added during a session. [`clear`](Self::clear)
/// drops everything when the connection is reset.
#[derive(Debug, Default)]
pub(crate) struct EntityCache {
    actions: RwLock<HashMap<String, Arc<Action>>>,
    thermostats: RwLock<HashMap<String, Arc<Thermostat>>>,
    meters: RwLock<HashMap<String, Arc<Meter>>>,
    locations: Locations,
    system_info: RwLock<Option<Arc<SystemInfo>>>,
}

impl EntityCache {
    pub(crate) fn action(&self, id: &str) -> Option<Arc<Action>> {
        self.actions.read().get(id).cloned()
    }

    pub(crate) fn actions(&self) -> Vec<Arc<Action>> {
        self.actions.read().values().cloned().collect()
    }

    /// Inserts an action unless one with the same id exists.
    ///
    /// Returns the cached instance.
    pub(crate) fn insert_action(&self, action: Action) -> Arc<Action> {
        Arc::clone(
            self.actions
                .write()
                .entry(action.id().to_string())
                .or_insert_with(|| Arc::new(action)),
        )
    }

    pub(crate) fn thermostat(&self, id: &str) -> Option<Arc<Thermostat>> {
        self.thermostats.read().get(id).cloned()
    }

    pub(crate) fn thermostats(&self) -> Vec<Arc<Thermostat>> {
        self.thermostats.read().values().cloned().collect()
    }

    pub(crate) fn insert_thermostat(&self, thermostat: Thermostat) -> Arc<Thermostat> {
        Arc::clone(
            self.thermostats
                .write()
                .entry(thermostat.id().to_string())
                .or_insert_with(|| Arc::new(thermostat)),
        )
    }

    pub(crate) fn meter(&self, id: &str) -> Option<Arc<Meter>> {
        self.meters.read().get(id).cloned()
    }

    pub(crate) fn meters(&self) -> Vec<Arc<Meter>> {
        self.meters.read().values().cloned().collect()
    }

    pub(crate) fn insert_meter(&self, meter: Meter) -> Arc<Meter> {
        Arc::clone(
            self.meters
                .write()
                .entry(meter.id().to_string())
                .or_insert_with(|| Arc::new(meter)),
        )
    }

    pub(crate) fn locations(&self) -> &Locations {
        &self.locations
    }

    pub(crate) fn location_list(&self) -> Vec<Location> {
        self.locations.all()
    }

    pub(crate) fn system_info(&self) -> Option<Arc<SystemInfo>> {
        self.system_info.read().clone()
    }

    pub(crate) fn set_system_info(&self, info: SystemInfo) {
        *self.system_info.write() = Some(Arc::new(info));
    }

    /// Drops every entity.
    pub(crate) fn clear(&self) {
        self.actions.write().clear();
        self.thermostats.write().clear();
        self.meters.write().clear();
        self.locations.clear();
        *self.system_info.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::protocol::DataMap;

    fn map(pairs: &[(&str, &str)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn insert_keeps_first_instance() {
        let cache = EntityCache::default();
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = cache.insert_action(
            Action::from_map(&map(&[("id", "1"), ("value1", "0")]), cache.locations(), &tx).unwrap(),
        );
        let second = cache.insert_action(
            Action::from_map(&map(&[("id", "1"), ("value1", "100")]), cache.locations(), &tx).unwrap(),
        );

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.actions().len(), 1);
        assert_eq!(second.state(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = EntityCache::default();
        cache.locations().insert("1", "Hall");
        cache.set_system_info(SystemInfo::default());
        cache.clear();
        assert!(cache.system_info().is_none());
        assert!(cache.location_list().is_empty());
    }
}
