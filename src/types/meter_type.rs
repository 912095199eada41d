// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Energy meter kinds as reported by `listenergy`.

use std::fmt;

/// Kind of an energy meter channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MeterType {
    /// Cumulative electricity meter.
    Energy,
    /// Electricity meter pushing real-time power through `getlive`.
    EnergyLive,
    /// Gas meter.
    Gas,
    /// Water meter.
    Water,
    /// Any other pulse counter.
    #[default]
    Generic,
}

impl MeterType {
    /// Maps a `listenergy` type code to a meter kind.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "0" => Self::Energy,
            "1" => Self::EnergyLive,
            "2" => Self::Gas,
            "3" => Self::Water,
            _ => Self::Generic,
        }
    }

    /// Returns `true` if readings are pushed live rather than read as series.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::EnergyLive)
    }

    /// Returns a lowercase name for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::EnergyLive => "energy_live",
            Self::Gas => "gas",
            Self::Water => "water",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_codes() {
        assert_eq!(MeterType::from_code("0"), MeterType::Energy);
        assert_eq!(MeterType::from_code("1"), MeterType::EnergyLive);
        assert_eq!(MeterType::from_code("2"), MeterType::Gas);
        assert_eq!(MeterType::from_code("3"), MeterType::Water);
        assert_eq!(MeterType::from_code("9"), MeterType::Generic);
    }

    #[test]
    fn only_energy_live_is_live() {
        assert!(MeterType::EnergyLive.is_live());
        assert!(!MeterType::Energy.is_live());
        assert!(!MeterType::Gas.is_live());
    }
}
