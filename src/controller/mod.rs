// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller client and its connection management.
//!
//! [`Controller`] is the entry point of the crate. It owns the connections
//! to one controller, keeps the entity cache current and reconnects after a
//! connection loss according to its [`ReconnectionPolicy`].
//!
//! # Lifecycle
//!
//! 1. [`Controller::start_communication`] connects and runs the bootstrap:
//!    system info, locations, actions, thermostats, meters, tariffs, alarms
//!    and finally `startevents`.
//! 2. The controller then pushes events, which update the cache and run the
//!    change callbacks.
//! 3. A read failure reports the controller offline and schedules
//!    reconnection; online is reported again after a new bootstrap.

mod client;
mod config;
mod connection_state;
mod dispatcher;

pub use client::Controller;
pub use config::{
    ControllerConfig, DEFAULT_CORRELATION_TIMEOUT, DEFAULT_IO_TIMEOUT, DEFAULT_PORT,
    ReconnectionPolicy,
};
pub use connection_state::{ConnectionState, OfflineReason};
