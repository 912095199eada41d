// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cached controller entities.
//!
//! Entities are created from the bootstrap lists sent after connecting and
//! updated in place by later replies and events. They are handed out as
//! `Arc`s whose contents change under interior mutability, so holding on to
//! one is the intended way to follow an entity.
//!
//! | Type | Source |
//! |---|---|
//! | [`Action`] | `listactions` |
//! | [`Thermostat`] | `listthermostat` |
//! | [`Meter`] | `listenergy`, `getenergydata`, `getlive` |
//! | [`Location`] | `listlocations` |
//! | [`SystemInfo`] | `systeminfo` |

mod action;
mod cache;
mod fields;
mod location;
mod meter;
mod system_info;
mod thermostat;

pub use action::Action;
pub(crate) use cache::EntityCache;
pub use location::Location;
pub use meter::{Meter, MeterReading};
pub use system_info::SystemInfo;
pub use thermostat::Thermostat;
pub(crate) use thermostat::to_tenths;
