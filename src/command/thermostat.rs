// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thermostat overrule duration.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::ValueError;

/// Duration of a thermostat overrule, sent as `"HH:MM"`.
///
/// # Examples
///
/// ```
/// use nhc_lib::command::OverruleTime;
///
/// let time = OverruleTime::from_minutes(125).unwrap();
/// assert_eq!(time.to_string(), "02:05");
/// assert_eq!(OverruleTime::parse("02:05"), Some(time));
/// assert!(OverruleTime::from_minutes(24 * 60).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OverruleTime(u16);

impl OverruleTime {
    /// Longest overrule the `HH:MM` format can express.
    pub const MAX_MINUTES: u16 = 23 * 60 + 59;

    /// Creates an overrule duration.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` beyond 23:59.
    pub fn from_minutes(minutes: u16) -> Result<Self, ValueError> {
        if minutes > Self::MAX_MINUTES {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: i64::from(Self::MAX_MINUTES),
                actual: i64::from(minutes),
            });
        }
        Ok(Self(minutes))
    }

    /// Parses an `HH:MM` value as reported in `overruletime`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (hours, minutes) = value.trim().split_once(':')?;
        let hours: u16 = hours.parse().ok()?;
        let minutes: u16 = minutes.parse().ok()?;
        if minutes >= 60 {
            return None;
        }
        Self::from_minutes(hours.checked_mul(60)?.checked_add(minutes)?).ok()
    }

    /// Returns the duration in minutes.
    #[must_use]
    pub const fn minutes(&self) -> u16 {
        self.0
    }

    /// Returns `true` for a zero duration (no overrule running).
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for OverruleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for OverruleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
