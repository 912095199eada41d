// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Actions: relays, dimmers, rollershutters and triggers.

use std::sync::Arc;

use parking_lot::RwLock;

use super::fields;
use super::location::Locations;
use crate::error::ParseError;
use crate::protocol::DataMap;
use crate::rollershutter::{RequestSink, Rollershutter};
use crate::types::ActionType;

/// An action as known to the controller.
///
/// Actions are created once per session and then updated in place, so an
/// `Arc<Action>` obtained from the controller stays valid and current until
/// the connection is reset.
#[derive(Debug)]
pub struct Action {
    id: String,
    numeric_id: u32,
    kind: ActionType,
    data: RwLock<ActionData>,
    shutter: Option<Arc<Rollershutter>>,
}

#[derive(Debug, Clone, Default)]
struct ActionData {
    name: String,
    location: String,
    state: u8,
    open_time: u32,
    close_time: u32,
}

/// Fields of one `listactions` item, validated as a whole.
#[derive(Debug, Default)]
struct ActionFields {
    name: Option<String>,
    location: Option<String>,
    state: Option<u8>,
    open_time: Option<u32>,
    close_time: Option<u32>,
}

impl ActionFields {
    fn parse(map: &DataMap, locations: &Locations) -> Result<Self, ParseError> {
        Ok(Self {
            name: fields::optional(map, "name").map(str::to_string),
            location: fields::optional(map, "location").map(|id| locations.resolve(id)),
            state: fields::parse(map, "value1")?,
            open_time: fields::parse(map, "opentime")?,
            close_time: fields::parse(map, "closetime")?,
        })
    }
}

impl Action {
    /// Creates an action from a bootstrap `listactions` item.
    pub(crate) fn from_map(
        map: &DataMap,
        locations: &Locations,
        requests: &RequestSink,
    ) -> Result<Self, ParseError> {
        let id = fields::required(map, "id")?.to_string();
        let numeric_id = id
            .parse()
            .map_err(|_| ParseError::invalid("id", format!("not an integer: {id:?}")))?;
        let kind = ActionType::from_code(fields::optional(map, "type").unwrap_or_default());
        let parsed = ActionFields::parse(map, locations)?;

        let data = ActionData {
            name: parsed.name.unwrap_or_default(),
            location: parsed.location.unwrap_or_default(),
            state: parsed.state.unwrap_or_default(),
            open_time: parsed.open_time.unwrap_or_default(),
            close_time: parsed.close_time.unwrap_or_default(),
        };
        let shutter = kind.is_rollershutter().then(|| {
            Rollershutter::new(
                numeric_id,
                data.state,
                data.open_time,
                data.close_time,
                requests.clone(),
            )
        });

        Ok(Self {
            id,
            numeric_id,
            kind,
            data: RwLock::new(data),
            shutter,
        })
    }

    /// Returns the action id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn numeric_id(&self) -> u32 {
        self.numeric_id
    }

    /// Returns the action type.
    #[must_use]
    pub fn kind(&self) -> ActionType {
        self.kind
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.data.read().name.clone()
    }

    /// Returns the location name.
    #[must_use]
    pub fn location(&self) -> String {
        self.data.read().location.clone()
    }

    /// Returns the current value (0-100).
    ///
    /// For rollershutters this is the estimated position.
    #[must_use]
    pub fn state(&self) -> u8 {
        match &self.shutter {
            Some(shutter) => shutter.position(),
            None => self.data.read().state,
        }
    }

    /// Returns the time in seconds to fully open a rollershutter.
    #[must_use]
    pub fn open_time(&self) -> u32 {
        self.data.read().open_time
    }

    /// Returns the time in seconds to fully close a rollershutter.
    #[must_use]
    pub fn close_time(&self) -> u32 {
        self.data.read().close_time
    }

    /// Returns the position estimator of a rollershutter action.
    #[must_use]
    pub fn rollershutter(&self) -> Option<&Arc<Rollershutter>> {
        self.shutter.as_ref()
    }

    /// Applies an item of a `listactions` reply or event.
    ///
    /// Nothing is applied if any present field is malformed. Returns `true`
    /// if something observable changed.
    pub(crate) fn apply(&self, map: &DataMap, locations: &Locations) -> Result<bool, ParseError> {
        let parsed = ActionFields::parse(map, locations)?;
        let mut changed = false;

        {
            let mut data = self.data.write();
            if let Some(name) = parsed.name
                && name != data.name
            {
                data.name = name;
                changed = true;
            }
            if let Some(location) = parsed.location
                && location != data.location
            {
                data.location = location;
                changed = true;
            }
            if let Some(open_time) = parsed.open_time {
                data.open_time = open_time;
            }
            if let Some(close_time) = parsed.close_time {
                data.close_time = close_time;
            }
            if let Some(shutter) = &self.shutter {
                shutter.set_travel_times(data.open_time, data.close_time);
            }
        }

        if let Some(state) = parsed.state {
            changed |= self.set_state(state);
        }
        Ok(changed)
    }

    /// Records a value reported by the controller.
    ///
    /// Returns `true` if the value changed.
    pub(crate) fn set_state(&self, state: u8) -> bool {
        if let Some(shutter) = &self.shutter {
            return shutter.on_position_update(state);
        }
        let mut data = self.data.write();
        if data.state == state {
            return false;
        }
        data.state = state;
        true
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn map(pairs: &[(&str, &str)]) -> DataMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn locations() -> Locations {
        let locations = Locations::default();
        locations.insert("1", "Kitchen");
        locations
    }

    #[test]
    fn dimmer_from_bootstrap_item() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let action = Action::from_map(
            &map(&[
                ("id", "12"),
                ("name", "Spots"),
                ("type", "2"),
                ("location", "1"),
                ("value1", "40"),
            ]),
            &locations(),
            &tx,
        )
        .unwrap();

        assert_eq!(action.id(), "12");
        assert_eq!(action.numeric_id(), 12);
        assert_eq!(action.kind(), ActionType::Dimmer);
        assert_eq!(action.location(), "Kitchen");
        assert_eq!(action.state(), 40);
        assert!(action.rollershutter().is_none());
    }

    #[test]
    fn non_numeric_id_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = Action::from_map(&map(&[("id", "x1")]), &locations(), &tx).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { .. }));
    }

    #[test]
    fn apply_reports_changes_only() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let action =
            Action::from_map(&map(&[("id", "3"), ("type", "1"), ("value1", "0")]), &locations(), &tx)
                .unwrap();

        assert!(action.apply(&map(&[("id", "3"), ("value1", "100")]), &locations()).unwrap());
        assert!(!action.apply(&map(&[("id", "3"), ("value1", "100")]), &locations()).unwrap());
        assert_eq!(action.state(), 100);
    }

    #[test]
    fn malformed_update_keeps_previous_value() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let action =
            Action::from_map(&map(&[("id", "3"), ("name", "Old"), ("value1", "10")]), &locations(), &tx)
                .unwrap();

        let err = action
            .apply(&map(&[("name", "New"), ("value1", "ten")]), &locations())
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { .. }));
        assert_eq!(action.name(), "Old");
        assert_eq!(action.state(), 10);
    }

    #[tokio::test]
    async fn rollershutter_state_comes_from_estimator() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let action = Action::from_map(
            &map(&[
                ("id", "9"),
                ("type", "4"),
                ("value1", "100"),
                ("opentime", "25"),
                ("closetime", "20"),
            ]),
            &locations(),
            &tx,
        )
        .unwrap();

        let shutter = action.rollershutter().unwrap();
        assert_eq!(shutter.travel_times(), (25, 20));
        assert_eq!(action.state(), 100);
        assert!(action.set_state(30));
        assert_eq!(action.state(), 30);
    }
}
