// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback management for controller subscriptions.
//!
//! This module provides the core types for managing subscription callbacks:
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`CallbackRegistry`] - Registry storing and dispatching callbacks

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::controller::OfflineReason;
use crate::state::{Action, Meter, Thermostat};

/// Unique identifier for a subscription.
///
/// This ID is returned when creating a subscription and can be used to
/// unsubscribe later. IDs are unique within a controller's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type OnlineCallback = Arc<dyn Fn() + Send + Sync>;
type OfflineCallback = Arc<dyn Fn(&OfflineReason) + Send + Sync>;
type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;
type ActionCallback = Arc<dyn Fn(&Action) + Send + Sync>;
type ThermostatCallback = Arc<dyn Fn(&Thermostat) + Send + Sync>;
type MeterCallback = Arc<dyn Fn(&Meter) + Send + Sync>;

/// Registry for controller callbacks.
///
/// Thread-safe through `parking_lot::RwLock`. Callbacks run synchronously on
/// the task that produced the event, usually the connection listener, so
/// they should return quickly.
pub struct CallbackRegistry {
    next_id: AtomicU64,
    online_callbacks: RwLock<HashMap<SubscriptionId, OnlineCallback>>,
    offline_callbacks: RwLock<HashMap<SubscriptionId, OfflineCallback>>,
    alarm_callbacks: RwLock<HashMap<SubscriptionId, MessageCallback>>,
    notice_callbacks: RwLock<HashMap<SubscriptionId, MessageCallback>>,
    action_callbacks: RwLock<HashMap<SubscriptionId, ActionCallback>>,
    thermostat_callbacks: RwLock<HashMap<SubscriptionId, ThermostatCallback>>,
    meter_callbacks: RwLock<HashMap<SubscriptionId, MeterCallback>>,
}

impl CallbackRegistry {
    /// Creates a new empty callback registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            online_callbacks: RwLock::new(HashMap::new()),
            offline_callbacks: RwLock::new(HashMap::new()),
            alarm_callbacks: RwLock::new(HashMap::new()),
            notice_callbacks: RwLock::new(HashMap::new()),
            action_callbacks: RwLock::new(HashMap::new()),
            thermostat_callbacks: RwLock::new(HashMap::new()),
            meter_callbacks: RwLock::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Registration methods
    // =========================================================================

    /// Registers a callback for when the controller comes online.
    pub fn on_online<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.online_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for when the controller goes offline.
    pub fn on_offline<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OfflineReason) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.offline_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for alarm messages.
    pub fn on_alarm<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.alarm_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for notice messages.
    pub fn on_notice<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.notice_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for action changes.
    pub fn on_action_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.action_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for thermostat changes.
    pub fn on_thermostat_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Thermostat) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.thermostat_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for meter changes.
    pub fn on_meter_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Meter) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.meter_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    // =========================================================================
    // Unsubscription
    // =========================================================================

    /// Unregisters a callback by its subscription ID.
    ///
    /// Returns `true` if a callback was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.online_callbacks.write().remove(&id).is_some()
            || self.offline_callbacks.write().remove(&id).is_some()
            || self.alarm_callbacks.write().remove(&id).is_some()
            || self.notice_callbacks.write().remove(&id).is_some()
            || self.action_callbacks.write().remove(&id).is_some()
            || self.thermostat_callbacks.write().remove(&id).is_some()
            || self.meter_callbacks.write().remove(&id).is_some()
    }

    /// Clears all callbacks.
    pub fn clear(&self) {
        self.online_callbacks.write().clear();
        self.offline_callbacks.write().clear();
        self.alarm_callbacks.write().clear();
        self.notice_callbacks.write().clear();
        self.action_callbacks.write().clear();
        self.thermostat_callbacks.write().clear();
        self.meter_callbacks.write().clear();
    }

    // =========================================================================
    // Dispatch methods
    // =========================================================================

    /// Dispatches the online event.
    pub fn dispatch_online(&self) {
        for callback in self.online_callbacks.read().values() {
            callback();
        }
    }

    /// Dispatches the offline event.
    pub fn dispatch_offline(&self, reason: &OfflineReason) {
        for callback in self.offline_callbacks.read().values() {
            callback(reason);
        }
    }

    /// Dispatches an alarm message.
    pub fn dispatch_alarm(&self, text: &str) {
        for callback in self.alarm_callbacks.read().values() {
            callback(text);
        }
    }

    /// Dispatches a notice message.
    pub fn dispatch_notice(&self, text: &str) {
        for callback in self.notice_callbacks.read().values() {
            callback(text);
        }
    }

    /// Dispatches an action change.
    pub fn dispatch_action(&self, action: &Action) {
        for callback in self.action_callbacks.read().values() {
            callback(action);
        }
    }

    /// Dispatches a thermostat change.
    pub fn dispatch_thermostat(&self, thermostat: &Thermostat) {
        for callback in self.thermostat_callbacks.read().values() {
            callback(thermostat);
        }
    }

    /// Dispatches a meter change.
    pub fn dispatch_meter(&self, meter: &Meter) {
        for callback in self.meter_callbacks.read().values() {
            callback(meter);
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Returns the total number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.online_callbacks.read().len()
            + self.offline_callbacks.read().len()
            + self.alarm_callbacks.read().len()
            + self.notice_callbacks.read().len()
            + self.action_callbacks.read().len()
            + self.thermostat_callbacks.read().len()
            + self.meter_callbacks.read().len()
    }

    /// Returns `true` if there are no registered callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback_count() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}
