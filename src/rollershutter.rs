// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Position estimation for rollershutter actions.
//!
//! The controller only knows three motor commands for a rollershutter (up,
//! down, stop) and reports the position when the motor stops. Moving to a
//! percentage therefore means starting the motor and stopping it again after
//! the time the shutter needs to travel that far, computed from the
//! configured full open and close times.
//!
//! # States
//!
//! | Phase | Meaning |
//! |---|---|
//! | [`Idle`](ShutterPhase::Idle) | Motor stopped, position known |
//! | [`Moving`](ShutterPhase::Moving) | Motor running, position is an estimate |
//! | [`AwaitingStopConfirmation`](ShutterPhase::AwaitingStopConfirmation) | Stop sent, waiting for the controller to report where it ended |
//!
//! A command received while moving is not run from an unknown starting
//! point: the shutter is stopped first, and the command runs once the
//! controller reports the stopped position. Only the latest such command is
//! kept.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::types::ShutterCommand;

/// Time to wait for the controller to report the position after a stop.
///
/// When it passes, the queued command is dropped: it never runs from an
/// unknown starting point.
pub const STOP_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(3);

/// An `executeactions` request produced by an estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActionRequest {
    pub(crate) id: u32,
    pub(crate) value: u8,
}

/// Where estimators deliver their device commands.
pub(crate) type RequestSink = mpsc::UnboundedSender<ActionRequest>;

/// Motion phase of a rollershutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutterPhase {
    /// The motor is stopped.
    #[default]
    Idle,
    /// The motor is running.
    Moving,
    /// A stop was sent and the resulting position is not known yet.
    AwaitingStopConfirmation,
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    /// Stops the motor at the end of a percentage move.
    AutoStop { target: u8 },
    /// Clears the moving flag.
    Settle,
    /// Gives up waiting for a stop confirmation.
    Confirmation,
}

#[derive(Debug, Default)]
struct Core {
    position: u8,
    open_time: u32,
    close_time: u32,
    phase: ShutterPhase,
    queued: Option<ShutterCommand>,
    filter_echo: bool,
    /// Bumped on every cancellation; timers from older epochs do nothing.
    epoch: u64,
    timers: Vec<AbortHandle>,
}

/// Timer driven position estimator of one rollershutter action.
#[derive(Debug)]
pub struct Rollershutter {
    id: u32,
    requests: RequestSink,
    core: Mutex<Core>,
    this: Weak<Self>,
}

impl Rollershutter {
    pub(crate) fn new(
        id: u32,
        position: u8,
        open_time: u32,
        close_time: u32,
        requests: RequestSink,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            requests,
            core: Mutex::new(Core {
                position: position.min(100),
                open_time,
                close_time,
                ..Core::default()
            }),
            this: this.clone(),
        })
    }

    /// Returns the estimated position, 100 being fully open.
    #[must_use]
    pub fn position(&self) -> u8 {
        self.core.lock().position
    }

    /// Returns the current motion phase.
    #[must_use]
    pub fn phase(&self) -> ShutterPhase {
        self.core.lock().phase
    }

    /// Returns `true` while the motor is believed to be running.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.phase() == ShutterPhase::Moving
    }

    /// Returns the full open and close times in seconds.
    #[must_use]
    pub fn travel_times(&self) -> (u32, u32) {
        let core = self.core.lock();
        (core.open_time, core.close_time)
    }

    pub(crate) fn set_travel_times(&self, open_time: u32, close_time: u32) {
        let mut core = self.core.lock();
        core.open_time = open_time;
        core.close_time = close_time;
    }

    /// Runs a command, stopping the shutter first if it is moving.
    pub(crate) fn execute(&self, command: ShutterCommand) {
        let mut core = self.core.lock();
        match core.phase {
            ShutterPhase::AwaitingStopConfirmation => {
                tracing::debug!(action = self.id, ?command, "Queueing until stop is confirmed");
                core.queued = Some(command);
            }
            ShutterPhase::Moving => {
                tracing::debug!(action = self.id, ?command, "Stopping before new command");
                self.cancel_timers(&mut core);
                self.emit(ShutterCommand::Stop);
                core.phase = ShutterPhase::AwaitingStopConfirmation;
                core.filter_echo = false;
                core.queued = (command != ShutterCommand::Stop).then_some(command);
                self.schedule(&mut core, STOP_CONFIRMATION_TIMEOUT, Timer::Confirmation);
            }
            ShutterPhase::Idle => self.run(&mut core, command),
        }
    }

    /// Feeds a position reported by the controller.
    ///
    /// Returns `true` if the estimate changed.
    pub(crate) fn on_position_update(&self, value: u8) -> bool {
        if value > 100 {
            tracing::debug!(action = self.id, value, "Ignoring non-position value");
            return false;
        }

        let mut core = self.core.lock();
        if core.phase == ShutterPhase::AwaitingStopConfirmation {
            self.cancel_timers(&mut core);
            core.phase = ShutterPhase::Idle;
            let changed = core.position != value;
            core.position = value;
            if let Some(command) = core.queued.take() {
                tracing::debug!(action = self.id, ?command, "Stop confirmed, running queued command");
                self.run(&mut core, command);
            }
            return changed;
        }

        if core.filter_echo {
            core.filter_echo = false;
            tracing::debug!(action = self.id, value, "Filtered position echo");
            return false;
        }

        let changed = core.position != value;
        core.position = value;
        changed
    }

    fn run(&self, core: &mut Core, command: ShutterCommand) {
        match command {
            ShutterCommand::Stop => {
                self.cancel_timers(core);
                self.emit(command);
                core.phase = ShutterPhase::Idle;
                core.filter_echo = false;
            }
            ShutterCommand::Up | ShutterCommand::Down => {
                let end = if command == ShutterCommand::Up { 100 } else { 0 };
                let duration = travel_time(core, end);
                self.cancel_timers(core);
                self.emit(command);
                if duration.is_zero() {
                    core.phase = ShutterPhase::Idle;
                } else {
                    core.phase = ShutterPhase::Moving;
                    self.schedule(core, duration, Timer::Settle);
                }
            }
            ShutterCommand::Position(target) => {
                if target == core.position {
                    tracing::debug!(action = self.id, target, "Already at target");
                    return;
                }
                let motor = if target > core.position {
                    ShutterCommand::Up
                } else {
                    ShutterCommand::Down
                };
                let duration = travel_time(core, target);
                self.cancel_timers(core);
                self.emit(motor);
                core.filter_echo = true;
                core.phase = ShutterPhase::Moving;
                self.schedule(core, duration, Timer::AutoStop { target });
                self.schedule(core, duration, Timer::Settle);
                tracing::debug!(
                    action = self.id,
                    from = core.position,
                    target,
                    duration_ms = duration.as_millis(),
                    "Moving to position"
                );
            }
        }
    }

    fn fire(&self, epoch: u64, timer: Timer) {
        let mut core = self.core.lock();
        if core.epoch != epoch {
            return;
        }
        match timer {
            Timer::AutoStop { target } => {
                self.emit(ShutterCommand::Stop);
                core.position = target;
                core.filter_echo = false;
                core.phase = ShutterPhase::Idle;
            }
            Timer::Settle => {
                if core.phase == ShutterPhase::Moving {
                    core.phase = ShutterPhase::Idle;
                }
            }
            Timer::Confirmation => {
                if core.phase == ShutterPhase::AwaitingStopConfirmation {
                    core.phase = ShutterPhase::Idle;
                    let dropped = core.queued.take();
                    tracing::warn!(action = self.id, ?dropped, "Stop not confirmed, dropping queued command");
                }
            }
        }
    }

    fn schedule(&self, core: &mut Core, delay: Duration, timer: Timer) {
        let epoch = core.epoch;
        let this = self.this.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shutter) = this.upgrade() {
                shutter.fire(epoch, timer);
            }
        });
        core.timers.push(handle.abort_handle());
    }

    fn cancel_timers(&self, core: &mut Core) {
        core.epoch = core.epoch.wrapping_add(1);
        for timer in core.timers.drain(..) {
            timer.abort();
        }
    }

    fn emit(&self, command: ShutterCommand) {
        let request = ActionRequest {
            id: self.id,
            value: command.value(),
        };
        if self.requests.send(request).is_err() {
            tracing::debug!(action = self.id, ?command, "Command sink closed, dropping");
        }
    }
}

impl Drop for Rollershutter {
    fn drop(&mut self) {
        for timer in self.core.get_mut().timers.drain(..) {
            timer.abort();
        }
    }
}

/// Time the motor needs from the current position to `target`.
///
/// Open and close times are seconds for a full traversal, so every percent
/// takes `time * 10` milliseconds.
fn travel_time(core: &Core, target: u8) -> Duration {
    let per_percent = if target > core.position {
        core.open_time
    } else {
        core.close_time
    };
    Duration::from_millis(u64::from(core.position.abs_diff(target)) * u64::from(per_percent) * 10)
}
