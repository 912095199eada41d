// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rollershutter commands.

use crate::error::ValueError;

/// `value1` that stops a moving shutter.
const STOP_VALUE: u8 = 253;
/// `value1` that drives a shutter down.
const DOWN_VALUE: u8 = 254;
/// `value1` that drives a shutter up.
const UP_VALUE: u8 = 255;

/// Command for a rollershutter action.
///
/// On the wire a rollershutter takes the same `executeactions` request as any
/// other action. Values 0-100 are target positions (100 is fully open) and
/// 253-255 are the motor commands.
///
/// # Examples
///
/// ```
/// use nhc_lib::types::ShutterCommand;
///
/// assert_eq!(ShutterCommand::from_value(255).unwrap(), ShutterCommand::Up);
/// assert_eq!(ShutterCommand::from_value(40).unwrap(), ShutterCommand::Position(40));
/// assert_eq!(ShutterCommand::Stop.value(), 253);
/// assert!(ShutterCommand::from_value(150).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutterCommand {
    /// Drive the shutter fully open.
    Up,
    /// Drive the shutter fully closed.
    Down,
    /// Stop the motor.
    Stop,
    /// Move to a percentage open (0-100).
    Position(u8),
}

impl ShutterCommand {
    /// Interprets an `executeactions` value for a rollershutter.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` for values that are neither a
    /// position nor a motor command.
    pub fn from_value(value: u8) -> Result<Self, ValueError> {
        match value {
            0..=100 => Ok(Self::Position(value)),
            STOP_VALUE => Ok(Self::Stop),
            DOWN_VALUE => Ok(Self::Down),
            UP_VALUE => Ok(Self::Up),
            other => Err(ValueError::OutOfRange {
                min: 0,
                max: 100,
                actual: i64::from(other),
            }),
        }
    }

    /// Returns the `value1` sent to the controller.
    #[must_use]
    pub const fn value(&self) -> u8 {
        match self {
            Self::Up => UP_VALUE,
            Self::Down => DOWN_VALUE,
            Self::Stop => STOP_VALUE,
            Self::Position(p) => *p,
        }
    }
}
