// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thermostats.

use std::cmp::Ordering;

use parking_lot::RwLock;

use super::fields;
use super::location::Locations;
use crate::command::OverruleTime;
use crate::error::ParseError;
use crate::protocol::DataMap;
use crate::types::ThermostatMode;

/// A thermostat as known to the controller.
///
/// Temperatures are kept in tenths of a degree, the controller's unit, and
/// exposed in degrees.
#[derive(Debug)]
pub struct Thermostat {
    id: String,
    numeric_id: u32,
    data: RwLock<ThermostatData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ThermostatData {
    name: String,
    location: String,
    measured: i32,
    setpoint: i32,
    overrule: i32,
    overrule_minutes: u16,
    mode: ThermostatMode,
    eco_save: bool,
}

impl ThermostatData {
    fn effective_setpoint(&self) -> i32 {
        if self.overrule_minutes > 0 {
            self.overrule
        } else {
            self.setpoint
        }
    }
}

impl Thermostat {
    /// Creates a thermostat from a bootstrap `listthermostat` item.
    pub(crate) fn from_map(map: &DataMap, locations: &Locations) -> Result<Self, ParseError> {
        let id = fields::required(map, "id")?.to_string();
        let numeric_id = id
            .parse()
            .map_err(|_| ParseError::invalid("id", format!("not an integer: {id:?}")))?;
        let thermostat = Self {
            id,
            numeric_id,
            data: RwLock::new(ThermostatData::default()),
        };
        thermostat.apply(map, locations)?;
        Ok(thermostat)
    }

    /// Returns the thermostat id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn numeric_id(&self) -> u32 {
        self.numeric_id
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

    /// Returns the measured temperature in degrees.
    #[must_use]
    pub fn measured(&self) -> f64 {
        degrees(self.data.read().measured)
    }

    /// Returns the program setpoint in degrees.
    #[must_use]
    pub fn setpoint(&self) -> f64 {
        degrees(self.data.read().setpoint)
    }

    /// Returns the overrule setpoint in degrees.
    #[must_use]
    pub fn overrule(&self) -> f64 {
        degrees(self.data.read().overrule)
    }

    /// Returns the remaining overrule time in minutes.
    #[must_use]
    pub fn overrule_minutes(&self) -> u16 {
        self.data.read().overrule_minutes
    }

    /// Returns the setpoint in force: the overrule while it runs, else the program setpoint.
    #[must_use]
    pub fn effective_setpoint(&self) -> f64 {
        degrees(self.data.read().effective_setpoint())
    }

    /// Returns the active program.
    #[must_use]
    pub fn mode(&self) -> ThermostatMode {
        self.data.read().mode
    }

    /// Returns `true` if the eco save switch is on.
    #[must_use]
    pub fn eco_save(&self) -> bool {
        self.data.read().eco_save
    }

    /// Returns the heating demand.
    ///
    /// `1` when heating, `-1` when cooling and `0` when the setpoint is
    /// reached or the thermostat is off.
    #[must_use]
    pub fn demand(&self) -> i8 {
        let data = self.data.read();
        if data.mode == ThermostatMode::Off {
            return 0;
        }
        match data.effective_setpoint().cmp(&data.measured) {
            Ordering::Greater => 1,
            Ordering::Less => -1,
            Ordering::Equal => 0,
        }
    }

    /// Applies an item of a `listthermostat` reply or event.
    ///
    /// Nothing is applied if any present field is malformed. Returns `true`
    /// if something changed.
    pub(crate) fn apply(&self, map: &DataMap, locations: &Locations) -> Result<bool, ParseError> {
        let mode = fields::parse::<u8>(map, "mode")?
            .map(|code| {
                ThermostatMode::try_from(code).map_err(|e| ParseError::invalid("mode", e.to_string()))
            })
            .transpose()?;
        let overrule_minutes = fields::optional(map, "overruletime")
            .map(|raw| {
                OverruleTime::parse(raw)
                    .map(|time| time.minutes())
                    .ok_or_else(|| ParseError::invalid("overruletime", format!("not HH:MM: {raw:?}")))
            })
            .transpose()?;
        let measured = fields::parse::<i32>(map, "measured")?;
        let setpoint = fields::parse::<i32>(map, "setpoint")?;
        let overrule = fields::parse::<i32>(map, "overrule")?;
        let eco_save = fields::parse::<u8>(map, "ecosave")?;

        let mut data = self.data.write();
        let before = data.clone();
        if let Some(name) = fields::optional(map, "name") {
            data.name = name.to_string();
        }
        if let Some(location) = fields::optional(map, "location") {
            data.location = locations.resolve(location);
        }
        if let Some(measured) = measured {
            data.measured = measured;
        }
        if let Some(setpoint) = setpoint {
            data.setpoint = setpoint;
        }
        if let Some(overrule) = overrule {
            data.overrule = overrule;
        }
        if let Some(minutes) = overrule_minutes {
            data.overrule_minutes = minutes;
        }
        if let Some(mode) = mode {
            data.mode = mode;
        }
        if let Some(eco_save) = eco_save {
            data.eco_save = eco_save != 0;
        }
        Ok(*data != before)
    }
}

fn degrees(tenths: i32) -> f64 {
    f64::from(tenths) / 10.0
}

/// Converts degrees to the controller's tenths, rounding to the nearest tenth.
pub(crate) fn to_tenths(degrees: f64) -> i32 {
    // Safe: room temperatures are far inside the i32 range
    #[allow(clippy::cast_possible_truncation)]
    let tenths = (degrees * 10.0).round() as i32;
    tenths
}
