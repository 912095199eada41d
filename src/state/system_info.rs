// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller metadata from `systeminfo`.

use super::fields;
use crate::error::ParseError;
use crate::protocol::DataMap;
use crate::types::ControllerTimeZone;

/// Snapshot of the controller's `systeminfo` reply.
///
/// # Examples
///
/// ```
/// use nhc_lib::protocol::{Payload, decode};
/// use nhc_lib::state::SystemInfo;
///
/// let msg = decode(r#"{"cmd":"systeminfo","data":{"swversion":"1.10.0.34209","api":"2","TZ":"3600","DST":"3600"}}"#).unwrap();
/// let Payload::Map(map) = msg.payload() else { unreachable!() };
/// let info = SystemInfo::from_map(map).unwrap();
///
/// assert_eq!(info.sw_version, "1.10.0.34209");
/// assert_eq!(info.utc_offset_secs(), 7200);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInfo {
    /// Firmware version.
    pub sw_version: String,
    /// Protocol API version.
    pub api: String,
    /// Controller clock as reported (`yyyyMMddHHmmss`).
    pub time: String,
    /// Configured language.
    pub language: String,
    /// Configured currency.
    pub currency: String,
    /// Configured units.
    pub units: String,
    /// Standard time offset in seconds east of UTC.
    pub tz_offset: i32,
    /// Daylight saving offset in seconds, added to `tz_offset`.
    pub dst_offset: i32,
    /// Last time the energy counters were reset.
    pub last_energy_erase: String,
    /// Last time the configuration was changed.
    pub last_config: String,
}

impl SystemInfo {
    /// Parses a `systeminfo` payload.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidValue` if `TZ` or `DST` is not an integer.
    pub fn from_map(map: &DataMap) -> Result<Self, ParseError> {
        let text = |field: &str| fields::optional(map, field).unwrap_or_default().to_string();
        Ok(Self {
            sw_version: text("swversion"),
            api: text("api"),
            time: text("time"),
            language: text("language"),
            currency: text("currency"),
            units: text("units"),
            tz_offset: fields::parse(map, "TZ")?.unwrap_or_default(),
            dst_offset: fields::parse(map, "DST")?.unwrap_or_default(),
            last_energy_erase: text("lastenergyerase"),
            last_config: text("lastconfig"),
        })
    }

    /// Returns the current total offset from UTC in seconds.
    #[must_use]
    pub fn utc_offset_secs(&self) -> i32 {
        self.tz_offset.saturating_add(self.dst_offset)
    }

    /// Returns the controller's time zone as a fixed offset.
    #[must_use]
    pub fn timezone(&self) -> ControllerTimeZone {
        ControllerTimeZone::from_offset_secs(self.utc_offset_secs())
    }
}
