// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscribable trait for event sources.

use crate::controller::OfflineReason;
use crate::state::{Action, Meter, Thermostat};
use crate::subscription::SubscriptionId;

/// Trait for types that support event subscriptions.
///
/// # Examples
///
/// ```no_run
/// use nhc_lib::controller::{Controller, ControllerConfig};
/// use nhc_lib::subscription::Subscribable;
///
/// # async fn example() -> nhc_lib::Result<()> {
/// let controller = Controller::new(ControllerConfig::new("192.168.1.20"));
///
/// controller.on_offline(|reason| eprintln!("controller offline: {reason}"));
/// let sub_id = controller.on_action_changed(|action| {
///     println!("{} is now {}", action.name(), action.state());
/// });
///
/// controller.start_communication().await?;
///
/// // Unsubscribe when no longer needed
/// controller.unsubscribe(sub_id);
/// # Ok(())
/// # }
/// ```
pub trait Subscribable {
    /// Subscribes to the controller coming online.
    ///
    /// Called after every successful bootstrap, including after a reconnect.
    fn on_online<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static;

    /// Subscribes to the controller going offline.
    fn on_offline<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OfflineReason) + Send + Sync + 'static;

    /// Subscribes to alarm messages.
    fn on_alarm<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static;

    /// Subscribes to notice messages.
    fn on_notice<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static;

    /// Subscribes to action changes.
    ///
    /// The callback runs only when a value actually changed.
    fn on_action_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Action) + Send + Sync + 'static;

    /// Subscribes to thermostat changes.
    fn on_thermostat_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Thermostat) + Send + Sync + 'static;

    /// Subscribes to meter readings and live values.
    fn on_meter_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Meter) + Send + Sync + 'static;

    /// Unsubscribes a callback by its subscription ID.
    ///
    /// Returns `true` if the subscription was found and removed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
