// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing of inbound messages to the entity cache and callbacks.
//!
//! Replies to bootstrap requests create entities, `event` pushes only update
//! entities that already exist. Nothing here returns an error: malformed
//! messages are logged and dropped so that the listener keeps running.

use chrono_tz::Tz;

use crate::protocol::{DataMap, Message, Payload};
use crate::rollershutter::RequestSink;
use crate::state::{Action, EntityCache, Location, Meter, SystemInfo, Thermostat};
use crate::subscription::CallbackRegistry;
use crate::types::ControllerTimeZone;

const ALARM_TYPE: &str = "0";
const NOTICE_TYPE: &str = "1";

/// Applies decoded messages to the session state.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    cache: EntityCache,
    callbacks: CallbackRegistry,
    requests: RequestSink,
    timezone: Option<Tz>,
}

impl Dispatcher {
    pub(crate) fn new(requests: RequestSink, timezone: Option<Tz>) -> Self {
        Self {
            cache: EntityCache::default(),
            callbacks: CallbackRegistry::new(),
            requests,
            timezone,
        }
    }

    pub(crate) fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub(crate) fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Returns the zone controller timestamps are read in.
    ///
    /// A configured zone wins over the offset from `systeminfo`.
    pub(crate) fn timezone(&self) -> ControllerTimeZone {
        match (self.timezone, self.cache.system_info()) {
            (Some(tz), _) => ControllerTimeZone::from(tz),
            (None, Some(info)) => info.timezone(),
            (None, None) => ControllerTimeZone::default(),
        }
    }

    /// Routes one message.
    pub(crate) fn dispatch(&self, message: &Message) {
        if let Some(cmd) = message.command() {
            self.on_reply(cmd, message);
        } else if let Some(event) = message.event() {
            self.on_event(event, message);
        }
    }

    fn on_reply(&self, cmd: &str, message: &Message) {
        match cmd {
            "systeminfo" => self.on_system_info(message),
            "listlocations" => self.on_locations(message),
            "listactions" => self.on_actions(message, true),
            "listthermostat" => self.on_thermostats(message, true),
            "listenergy" => self.on_meters(message),
            "getlive" => self.on_live(cmd, message),
            "startevents" | "stoplive" | "executeactions" | "executethermostat" => {
                self.on_acknowledgement(cmd, message);
            }
            "getenergydata" => {
                tracing::debug!("Energy data reply without a pending read, ignoring");
            }
            _ => tracing::debug!(cmd, "Ignoring reply"),
        }
    }

    fn on_event(&self, event: &str, message: &Message) {
        match event {
            "listactions" => self.on_actions(message, false),
            "listthermostat" => self.on_thermostats(message, false),
            "getlive" => self.on_live(event, message),
            "getalarms" => self.on_alarms(message),
            _ => tracing::debug!(event, "Ignoring event"),
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    fn on_acknowledgement(&self, cmd: &str, message: &Message) {
        match message.error_code() {
            Some(0) => tracing::trace!(cmd, "Acknowledged"),
            Some(code) => tracing::warn!(cmd, code, "Controller rejected command"),
            None => tracing::debug!(cmd, shape = message.payload().shape(), "Reply without error code"),
        }
    }

    fn on_system_info(&self, message: &Message) {
        let Some(map) = self.expect_map("systeminfo", message) else {
            return;
        };
        match SystemInfo::from_map(map) {
            Ok(info) => {
                tracing::info!(
                    version = %info.sw_version,
                    api = %info.api,
                    offset = info.utc_offset_secs(),
                    "Controller system info"
                );
                self.cache.set_system_info(info);
            }
            Err(e) => tracing::warn!(error = %e, "Invalid system info"),
        }
    }

    fn on_locations(&self, message: &Message) {
        let Some(items) = self.expect_list("listlocations", message) else {
            return;
        };
        for item in items {
            match Location::from_map(item) {
                Ok(location) => self.cache.locations().add(location),
                Err(e) => tracing::warn!(error = %e, "Skipping location"),
            }
        }
    }

    fn on_actions(&self, message: &Message, create: bool) {
        let Some(items) = self.expect_items("listactions", message) else {
            return;
        };
        let locations = self.cache.locations();
        for item in items {
            let Some(id) = item.get("id") else {
                tracing::warn!("Action update without id, skipping");
                continue;
            };
            if let Some(action) = self.cache.action(id) {
                match action.apply(item, locations) {
                    Ok(true) => self.callbacks.dispatch_action(&action),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(action = %id, error = %e, "Invalid action update"),
                }
            } else if create {
                match Action::from_map(item, locations, &self.requests) {
                    Ok(action) => {
                        let action = self.cache.insert_action(action);
                        tracing::debug!(action = %id, kind = ?action.kind(), "Action added");
                    }
                    Err(e) => tracing::warn!(action = %id, error = %e, "Skipping action"),
                }
            } else {
                tracing::debug!(action = %id, "Event for unknown action, ignoring");
            }
        }
    }

    fn on_thermostats(&self, message: &Message, create: bool) {
        let Some(items) = self.expect_items("listthermostat", message) else {
            return;
        };
        let locations = self.cache.locations();
        for item in items {
            let Some(id) = item.get("id") else {
                tracing::warn!("Thermostat update without id, skipping");
                continue;
            };
            if let Some(thermostat) = self.cache.thermostat(id) {
                match thermostat.apply(item, locations) {
                    Ok(true) => self.callbacks.dispatch_thermostat(&thermostat),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(thermostat = %id, error = %e, "Invalid thermostat update");
                    }
                }
            } else if create {
                match Thermostat::from_map(item, locations) {
                    Ok(thermostat) => {
                        self.cache.insert_thermostat(thermostat);
                        tracing::debug!(thermostat = %id, "Thermostat added");
                    }
                    Err(e) => tracing::warn!(thermostat = %id, error = %e, "Skipping thermostat"),
                }
            } else {
                tracing::debug!(thermostat = %id, "Event for unknown thermostat, ignoring");
            }
        }
    }

    fn on_meters(&self, message: &Message) {
        let Some(items) = self.expect_list("listenergy", message) else {
            return;
        };
        let tz = self.timezone();
        for item in items {
            match Meter::from_map(item, self.cache.locations(), &tz) {
                Ok(meter) => {
                    if let Some(existing) = self.cache.meter(meter.id()) {
                        if existing.apply(&meter) {
                            self.callbacks.dispatch_meter(&existing);
                        }
                    } else {
                        let meter = self.cache.insert_meter(meter);
                        tracing::debug!(meter = %meter.id(), kind = ?meter.kind(), "Meter added");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Skipping meter"),
            }
        }
    }

    fn on_live(&self, name: &str, message: &Message) {
        let Some(map) = self.expect_map(name, message) else {
            return;
        };
        let (Some(channel), Some(raw)) = (map.get("channel"), map.get("value")) else {
            self.on_acknowledgement(name, message);
            return;
        };
        let Some(meter) = self.cache.meter(channel) else {
            tracing::debug!(meter = %channel, "Live value for unknown meter, ignoring");
            return;
        };
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => {
                if meter.set_live(value) {
                    self.callbacks.dispatch_meter(&meter);
                }
            }
            _ => tracing::debug!(meter = %channel, value = %raw, "Dropping malformed live value"),
        }
    }

    fn on_alarms(&self, message: &Message) {
        let Some(items) = self.expect_items("getalarms", message) else {
            return;
        };
        for item in items {
            let text = item.get("text").map_or("", String::as_str);
            match item.get("type").map(String::as_str) {
                Some(ALARM_TYPE) => {
                    tracing::info!(text, "Controller alarm");
                    self.callbacks.dispatch_alarm(text);
                }
                Some(NOTICE_TYPE) => {
                    tracing::info!(text, "Controller notice");
                    self.callbacks.dispatch_notice(text);
                }
                other => tracing::debug!(kind = ?other, text, "Ignoring alarm of unknown type"),
            }
        }
    }

    // =========================================================================
    // Shape checks
    // =========================================================================

    fn expect_map<'a>(&self, name: &str, message: &'a Message) -> Option<&'a DataMap> {
        match message.payload() {
            Payload::Map(map) => Some(map),
            Payload::List(_) | Payload::Series(_) => {
                self.mismatch(name, "map", message);
                None
            }
        }
    }

    fn expect_list<'a>(&self, name: &str, message: &'a Message) -> Option<&'a [DataMap]> {
        match message.payload() {
            Payload::List(items) => Some(items),
            Payload::Map(_) | Payload::Series(_) => {
                self.mismatch(name, "list", message);
                None
            }
        }
    }

    /// Accepts a list of items or a single item.
    ///
    /// A map carrying an `error` code is an error report, not an item.
    fn expect_items<'a>(&self, name: &str, message: &'a Message) -> Option<&'a [DataMap]> {
        match message.payload() {
            Payload::List(items) => Some(items),
            Payload::Map(map) if message.error_code().is_none() => {
                Some(std::slice::from_ref(map))
            }
            Payload::Map(_) | Payload::Series(_) => {
                self.mismatch(name, "list", message);
                None
            }
        }
    }

    #[allow(clippy::unused_self)]
    fn mismatch(&self, name: &str, expected: &str, message: &Message) {
        match message.error_code() {
            Some(0) => tracing::debug!(name, "Empty success reply"),
            Some(code) => tracing::warn!(name, code, "Controller reported an error"),
            None => tracing::warn!(
                name,
                expected,
                actual = message.payload().shape(),
                "Unexpected payload shape, dropping message"
            ),
        }
    }
}
