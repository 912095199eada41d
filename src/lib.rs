// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `nhc_lib` - A Rust client for Niko Home Control I controllers.
//!
//! The controller speaks newline-delimited JSON over a plain TCP socket
//! (port 8000). This library connects, loads the installation (locations,
//! actions, thermostats and energy meters), follows the events the
//! controller pushes and sends commands.
//!
//! # Supported Features
//!
//! - **Actions**: relays, dimmers, triggers and rollershutters
//! - **Rollershutter positions**: percentage moves estimated from the
//!   configured travel times, since the controller only knows up, down and stop
//! - **Thermostats**: program changes and setpoint overrules
//! - **Energy meters**: cumulative and daily totals from 10-minute series,
//!   live values
//! - **Alarms and notices** pushed by the controller
//! - **Automatic reconnection** with exponential backoff
//!
//! # Quick Start
//!
//! ```no_run
//! use nhc_lib::controller::{Controller, ControllerConfig};
//! use nhc_lib::subscription::Subscribable;
//!
//! #[tokio::main]
//! async fn main() -> nhc_lib::Result<()> {
//!     let controller = Controller::new(ControllerConfig::new("192.168.1.20"));
//!
//!     controller.on_action_changed(|action| {
//!         println!("{} is now {}", action.name(), action.state());
//!     });
//!     controller.on_alarm(|text| eprintln!("ALARM: {text}"));
//!
//!     controller.start_communication().await?;
//!
//!     // Switch on a relay
//!     controller.execute_action("3", 100).await?;
//!
//!     // Move a rollershutter to 40% open
//!     controller.execute_action("7", 40).await?;
//!
//!     // Read a meter
//!     controller.execute_meter("0").await?;
//!     if let Some(meter) = controller.meter("0") {
//!         println!("today: {:?}", meter.day_total());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Logging
//!
//! Diagnostics are emitted through [`tracing`]. Raw protocol lines are
//! logged at `trace` level. The library never installs a subscriber.

pub mod command;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod rollershutter;
pub mod state;
pub mod subscription;
pub mod types;

pub use command::Command;
pub use controller::{ConnectionState, Controller, ControllerConfig, OfflineReason, ReconnectionPolicy};
pub use error::{Error, ParseError, ProtocolError, Result, ValueError};
pub use state::{Action, Location, Meter, MeterReading, SystemInfo, Thermostat};
pub use subscription::{CallbackRegistry, Subscribable, SubscriptionId};
pub use types::{ActionType, ControllerTimeZone, MeterType, ShutterCommand, ThermostatMode};
