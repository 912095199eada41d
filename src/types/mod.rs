// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for Niko Home Control I entities.
//!
//! The controller encodes almost everything as small integers inside JSON
//! strings. The types here give those integers names and carry the
//! conversions in both directions.
//!
//! # Types
//!
//! - [`ActionType`] - Kind of an action (relay, dimmer, rollershutter, ...)
//! - [`MeterType`] - Kind of an energy meter channel
//! - [`ThermostatMode`] - Thermostat program
//! - [`ShutterCommand`] - Command for a rollershutter action
//! - [`ControllerTimeZone`] - Time zone used for controller timestamps

mod action_type;
mod meter_type;
mod shutter;
mod thermostat_mode;
pub(crate) mod timestamp;

pub use action_type::ActionType;
pub use meter_type::MeterType;
pub use shutter::ShutterCommand;
pub use thermostat_mode::ThermostatMode;
pub use timestamp::{CONTROLLER_STAMP_FORMAT, ControllerTimeZone};
