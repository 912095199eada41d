// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Locations and the id to name lookup used while parsing other entities.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::fields;
use crate::error::ParseError;
use crate::protocol::DataMap;

/// A room or zone configured on the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Location id.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Location {
    pub(crate) fn from_map(map: &DataMap) -> Result<Self, ParseError> {
        Ok(Self {
            id: fields::required(map, "id")?.to_string(),
            name: fields::optional(map, "name").unwrap_or_default().to_string(),
        })
    }
}

/// Location table of one session.
#[derive(Debug, Default)]
pub(crate) struct Locations {
    by_id: RwLock<HashMap<String, Location>>,
}

impl Locations {
    #[cfg(test)]
    pub(crate) fn insert(&self, id: &str, name: &str) {
        self.by_id.write().insert(
            id.to_string(),
            Location {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
    }

    pub(crate) fn add(&self, location: Location) {
        self.by_id.write().insert(location.id.clone(), location);
    }

    /// Returns the name of a location id.
    ///
    /// Unknown ids are kept as they are; entities only hold a weak reference
    /// to their location.
    pub(crate) fn resolve(&self, id: &str) -> String {
        self.by_id
            .read()
            .get(id)
            .map_or_else(|| id.to_string(), |location| location.name.clone())
    }

    pub(crate) fn all(&self) -> Vec<Location> {
        self.by_id.read().values().cloned().collect()
    }

    pub(crate) fn clear(&self) {
        self.by_id.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_known_and_unknown() {
        let locations = Locations::default();
        locations.insert("2", "Garage");
        assert_eq!(locations.resolve("2"), "Garage");
        assert_eq!(locations.resolve("5"), "5");
    }

    #[test]
    fn location_requires_id() {
        let map: DataMap = [("name".to_string(), "Hall".to_string())].into();
        assert!(Location::from_map(&map).is_err());
    }
}
