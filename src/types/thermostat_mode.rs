// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thermostat programs.

use crate::error::ValueError;

/// Thermostat program selected on the controller.
///
/// # Examples
///
/// ```
/// use nhc_lib::types::ThermostatMode;
///
/// let mode = ThermostatMode::try_from(3).unwrap();
/// assert_eq!(mode, ThermostatMode::Off);
/// assert_eq!(mode.code(), 3);
/// assert!(ThermostatMode::try_from(8).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThermostatMode {
    /// Day program.
    #[default]
    Day,
    /// Night program.
    Night,
    /// Eco program.
    Eco,
    /// Thermostat switched off.
    Off,
    /// Cooling.
    Cool,
    /// User program 1.
    Program1,
    /// User program 2.
    Program2,
    /// User program 3.
    Program3,
}

impl ThermostatMode {
    /// Returns the numeric code sent as `mode`.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Day => 0,
            Self::Night => 1,
            Self::Eco => 2,
            Self::Off => 3,
            Self::Cool => 4,
            Self::Program1 => 5,
            Self::Program2 => 6,
            Self::Program3 => 7,
        }
    }
}

impl TryFrom<u8> for ThermostatMode {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Day,
            1 => Self::Night,
            2 => Self::Eco,
            3 => Self::Off,
            4 => Self::Cool,
            5 => Self::Program1,
            6 => Self::Program2,
            7 => Self::Program3,
            other => {
                return Err(ValueError::OutOfRange {
                    min: 0,
                    max: 7,
                    actual: i64::from(other),
                });
            }
        })
    }
}
