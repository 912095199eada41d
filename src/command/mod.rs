// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound controller requests.
//!
//! Every request is one JSON object tagged with its `cmd` name. The
//! [`Command`] enum serializes straight to that shape, so encoding a request
//! is a single [`encode`](crate::protocol::encode) call.
//!
//! # Available Commands
//!
//! | Command | Purpose |
//! |---|---|
//! | `systeminfo` | Firmware, API version and time zone |
//! | `listlocations`, `listactions`, `listthermostat`, `listenergy` | Bootstrap entity lists |
//! | `listthermostatHVAC`, `readtariffdata`, `getalarms` | Bootstrap extras |
//! | `startevents` | Switch the connection to push mode |
//! | `executeactions` | Set an action value |
//! | `executethermostat` | Change thermostat mode or overrule |
//! | `getenergydata` | Read a meter series over a time window |
//! | `getlive`, `stoplive` | Start or stop live meter pushes |
//!
//! # Examples
//!
//! ```
//! use nhc_lib::command::Command;
//! use nhc_lib::protocol::encode;
//!
//! assert_eq!(encode(&Command::ListActions).unwrap(), "{\"cmd\":\"listactions\"}\n");
//!
//! let cmd = Command::execute_action(12, 100);
//! assert_eq!(cmd.name(), "executeactions");
//! assert_eq!(
//!     encode(&cmd).unwrap(),
//!     "{\"cmd\":\"executeactions\",\"id\":12,\"value1\":100}\n"
//! );
//! ```

mod energy;
mod thermostat;

pub(crate) use energy::BUCKET_MINUTES;
pub use energy::EnergyWindow;
pub use thermostat::OverruleTime;

use serde::Serialize;

use crate::types::{ControllerTimeZone, ThermostatMode};

/// A request sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Query controller metadata.
    #[serde(rename = "systeminfo")]
    SystemInfo,
    /// List locations.
    #[serde(rename = "listlocations")]
    ListLocations,
    /// List actions with their current values.
    #[serde(rename = "listactions")]
    ListActions,
    /// List thermostats.
    #[serde(rename = "listthermostat")]
    ListThermostats,
    /// List the HVAC extension of thermostats.
    #[serde(rename = "listthermostatHVAC")]
    ListThermostatsHvac,
    /// List energy meter channels.
    #[serde(rename = "listenergy")]
    ListEnergy,
    /// Read tariff configuration.
    #[serde(rename = "readtariffdata")]
    ReadTariffData,
    /// Read the alarm log.
    #[serde(rename = "getalarms")]
    GetAlarms,
    /// Switch the connection into event push mode.
    #[serde(rename = "startevents")]
    StartEvents,
    /// Set the value of an action.
    #[serde(rename = "executeactions")]
    ExecuteAction {
        /// Action id.
        id: u32,
        /// New value.
        value1: u8,
    },
    /// Change a thermostat.
    #[serde(rename = "executethermostat")]
    ExecuteThermostat {
        /// Thermostat id.
        id: u32,
        /// New program code.
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<u8>,
        /// Overrule setpoint in tenths of a degree.
        #[serde(skip_serializing_if = "Option::is_none")]
        overrule: Option<i32>,
        /// Overrule duration.
        #[serde(skip_serializing_if = "Option::is_none")]
        overruletime: Option<OverruleTime>,
    },
    /// Read a meter series.
    #[serde(rename = "getenergydata")]
    GetEnergyData {
        /// Meter channel.
        channel: u32,
        /// Window start, `yyyyMMddHHmm` in controller time.
        start: String,
        /// Window end, `yyyyMMddHHmm` in controller time.
        end: String,
    },
    /// Start live pushes for a meter channel.
    #[serde(rename = "getlive")]
    GetLive {
        /// Meter channel.
        channel: u32,
    },
    /// Stop live pushes for a meter channel.
    #[serde(rename = "stoplive")]
    StopLive {
        /// Meter channel.
        channel: u32,
    },
}

impl Command {
    /// Creates an `executeactions` request.
    #[must_use]
    pub const fn execute_action(id: u32, value: u8) -> Self {
        Self::ExecuteAction { id, value1: value }
    }

    /// Creates an `executethermostat` request that switches program.
    #[must_use]
    pub const fn thermostat_mode(id: u32, mode: ThermostatMode) -> Self {
        Self::ExecuteThermostat {
            id,
            mode: Some(mode.code()),
            overrule: None,
            overruletime: None,
        }
    }

    /// Creates an `executethermostat` request that overrules the setpoint.
    ///
    /// `setpoint_tenths` is in tenths of a degree, the unit the controller
    /// uses for temperatures.
    #[must_use]
    pub const fn thermostat_overrule(id: u32, setpoint_tenths: i32, duration: OverruleTime) -> Self {
        Self::ExecuteThermostat {
            id,
            mode: None,
            overrule: Some(setpoint_tenths),
            overruletime: Some(duration),
        }
    }

    /// Creates a `getenergydata` request for a window, formatted in `tz`.
    #[must_use]
    pub fn energy_data(channel: u32, window: &EnergyWindow, tz: &ControllerTimeZone) -> Self {
        Self::GetEnergyData {
            channel,
            start: tz.format_stamp(window.start()),
            end: tz.format_stamp(window.end()),
        }
    }

    /// Returns the `cmd` name of this request.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SystemInfo => "systeminfo",
            Self::ListLocations => "listlocations",
            Self::ListActions => "listactions",
            Self::ListThermostats => "listthermostat",
            Self::ListThermostatsHvac => "listthermostatHVAC",
            Self::ListEnergy => "listenergy",
            Self::ReadTariffData => "readtariffdata",
            Self::GetAlarms => "getalarms",
            Self::StartEvents => "startevents",
            Self::ExecuteAction { .. } => "executeactions",
            Self::ExecuteThermostat { .. } => "executethermostat",
            Self::GetEnergyData { .. } => "getenergydata",
            Self::GetLive { .. } => "getlive",
            Self::StopLive { .. } => "stoplive",
        }
    }

    /// The fixed request sequence sent after connecting, in order.
    ///
    /// `startevents` comes last: after it the controller pushes events on
    /// the same socket and no more plain request/reply pairs are possible.
    #[must_use]
    pub fn bootstrap_sequence() -> [Self; 9] {
        [
            Self::SystemInfo,
            Self::ListLocations,
            Self::ListActions,
            Self::ListThermostats,
            Self::ListThermostatsHvac,
            Self::ListEnergy,
            Self::ReadTariffData,
            Self::GetAlarms,
            Self::StartEvents,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;

    fn json(cmd: &Command) -> serde_json::Value {
        serde_json::to_value(cmd).unwrap()
    }

    #[test]
    fn unit_commands_carry_only_cmd() {
        for cmd in Command::bootstrap_sequence() {
            let value = json(&cmd);
            let obj = value.as_object().unwrap();
            assert_eq!(obj.len(), 1);
            assert_eq!(obj["cmd"], cmd.name());
        }
    }

    #[test]
    fn bootstrap_ends_with_startevents() {
        let seq = Command::bootstrap_sequence();
        assert_eq!(seq[0], Command::SystemInfo);
        assert_eq!(seq[8], Command::StartEvents);
    }

    #[test]
    fn thermostat_mode_omits_overrule() {
        let value = json(&Command::thermostat_mode(3, ThermostatMode::Eco));
        assert_eq!(
            value,
            serde_json::json!({"cmd": "executethermostat", "id": 3, "mode": 2})
        );
    }

    #[test]
    fn thermostat_overrule_fields() {
        let duration = OverruleTime::from_minutes(90).unwrap();
        let value = json(&Command::thermostat_overrule(3, 215, duration));
        assert_eq!(
            value,
            serde_json::json!({
                "cmd": "executethermostat",
                "id": 3,
                "overrule": 215,
                "overruletime": "01:30"
            })
        );
    }

    #[test]
    fn live_commands() {
        assert_eq!(
            encode(&Command::GetLive { channel: 4 }).unwrap(),
            "{\"cmd\":\"getlive\",\"channel\":4}\n"
        );
        assert_eq!(Command::StopLive { channel: 4 }.name(), "stoplive");
    }
}
