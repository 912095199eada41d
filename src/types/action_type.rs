// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Action kinds as reported by `listactions`.

use std::fmt;

/// Kind of a controller action.
///
/// The numeric codes come from the `type` field of a `listactions` entry.
/// Codes that are not known map to [`ActionType::Generic`].
///
/// # Examples
///
/// ```
/// use nhc_lib::types::ActionType;
///
/// assert_eq!(ActionType::from_code("2"), ActionType::Dimmer);
/// assert_eq!(ActionType::from_code("4"), ActionType::Rollershutter);
/// assert_eq!(ActionType::from_code("5"), ActionType::Rollershutter);
/// assert_eq!(ActionType::from_code("42"), ActionType::Generic);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActionType {
    /// Unknown or unsupported action kind.
    #[default]
    Generic,
    /// Push button or scene trigger, stateless.
    Trigger,
    /// On/off switch, state is 0 or 100.
    Relay,
    /// Dimmer, state is 0-100.
    Dimmer,
    /// Motorized shutter, state is the estimated percentage open.
    Rollershutter,
}

impl ActionType {
    /// Maps a `listactions` type code to an action kind.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" => Self::Trigger,
            "1" => Self::Relay,
            "2" => Self::Dimmer,
            "4" | "5" => Self::Rollershutter,
            _ => Self::Generic,
        }
    }

    /// Returns `true` for rollershutter actions.
    #[must_use]
    pub const fn is_rollershutter(&self) -> bool {
        matches!(self, Self::Rollershutter)
    }

    /// Returns a lowercase name for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Trigger => "trigger",
            Self::Relay => "relay",
            Self::Dimmer => "dimmer",
            Self::Rollershutter => "rollershutter",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
