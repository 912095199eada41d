// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The controller client.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::ControllerConfig;
use super::connection_state::{ConnectionState, OfflineReason};
use super::dispatcher::Dispatcher;
use crate::command::{BUCKET_MINUTES, Command, EnergyWindow, OverruleTime};
use crate::error::{Error, ProtocolError, Result, ValueError};
use crate::protocol::Payload;
use crate::protocol::connection::Connection;
use crate::rollershutter::ActionRequest;
use crate::state::{Action, Location, Meter, SystemInfo, Thermostat, to_tenths};
use crate::subscription::{Subscribable, SubscriptionId};
use crate::types::{ControllerTimeZone, ShutterCommand, ThermostatMode};

/// Lowest overrule setpoint accepted, in degrees.
const MIN_SETPOINT: i64 = -50;
/// Highest overrule setpoint accepted, in degrees.
const MAX_SETPOINT: i64 = 100;

/// A read failure reported by the listener of one connection.
#[derive(Debug)]
struct Loss {
    generation: u64,
    error: ProtocolError,
}

type Receivers = (
    mpsc::UnboundedReceiver<ActionRequest>,
    mpsc::UnboundedReceiver<Loss>,
);

/// Client for one Niko Home Control I controller.
///
/// The controller keeps two connections: the primary one carries the
/// bootstrap sequence, commands and pushed events, a secondary one is opened
/// on demand for meter reads so that long energy queries do not hold up
/// events.
///
/// Entities are read from the cache filled by the bootstrap and kept current
/// by events. Changes are announced through the [`Subscribable`] callbacks.
///
/// # Examples
///
/// ```no_run
/// use nhc_lib::controller::{Controller, ControllerConfig};
///
/// # async fn example() -> nhc_lib::Result<()> {
/// let controller = Controller::new(ControllerConfig::new("192.168.1.20"));
/// controller.start_communication().await?;
///
/// for action in controller.actions() {
///     println!("{} ({}): {}", action.name(), action.location(), action.state());
/// }
/// controller.execute_action("12", 100).await?;
/// # Ok(())
/// # }
/// ```
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    config: ControllerConfig,
    dispatcher: Arc<Dispatcher>,
    state: RwLock<ConnectionState>,
    /// Set while the collaborator wants the controller online.
    active: AtomicBool,
    /// Identifies the current primary connection; losses of older ones are ignored.
    generation: AtomicU64,
    primary: RwLock<Option<Arc<Connection>>>,
    metering: tokio::sync::Mutex<Option<Connection>>,
    /// Held for a whole meter read, from the previous reading to the update.
    meter_reads: tokio::sync::Mutex<()>,
    /// Serializes connect, reconnect and disconnect.
    lifecycle: tokio::sync::Mutex<()>,
    losses: mpsc::UnboundedSender<Loss>,
    receivers: Mutex<Option<Receivers>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Creates a controller client. Nothing is connected until
    /// [`start_communication`](Self::start_communication).
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (losses_tx, losses_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(requests_tx, config.timezone));

        Self {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                state: RwLock::new(ConnectionState::Disconnected),
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                primary: RwLock::new(None),
                metering: tokio::sync::Mutex::new(None),
                meter_reads: tokio::sync::Mutex::new(()),
                lifecycle: tokio::sync::Mutex::new(()),
                losses: losses_tx,
                receivers: Mutex::new(Some((requests_rx, losses_rx))),
                workers: Mutex::new(Vec::new()),
                reconnect: Mutex::new(None),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects, runs the bootstrap sequence and starts listening for events.
    ///
    /// On success the online callbacks run. On failure the offline callbacks
    /// run and reconnection is scheduled according to the policy.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::ConnectionFailed` if no host is configured and
    /// any connection or bootstrap error otherwise.
    pub async fn start_communication(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.config.host.trim().is_empty() {
            let reason = OfflineReason::ConfigurationError("no controller host configured".into());
            inner.set_state(ConnectionState::Failed(reason.detail().to_string()));
            inner.dispatcher.callbacks().dispatch_offline(&reason);
            return Err(ProtocolError::ConnectionFailed(reason.detail().to_string()).into());
        }
        inner.ensure_workers();

        let _guard = inner.lifecycle.lock().await;
        inner.abort_reconnect();
        inner.active.store(true, Ordering::Release);
        match inner.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(peer = %inner.peer(), error = %e, "Controller connection failed");
                inner
                    .dispatcher
                    .callbacks()
                    .dispatch_offline(&OfflineReason::CommunicationError(e.to_string()));
                inner.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Drops the session, including all cached entities, and starts over.
    ///
    /// # Errors
    ///
    /// Same as [`start_communication`](Self::start_communication).
    pub async fn reset_communication(&self) -> Result<()> {
        tracing::info!(peer = %self.inner.peer(), "Resetting controller communication");
        self.stop_communication().await;
        self.inner.dispatcher.cache().clear();
        self.start_communication().await
    }

    /// Closes both connections and cancels reconnection.
    ///
    /// Idempotent. Cached entities stay readable.
    pub async fn stop_communication(&self) {
        let inner = &self.inner;
        let _guard = inner.lifecycle.lock().await;
        inner.active.store(false, Ordering::Release);
        inner.abort_reconnect();
        inner.close_connections().await;
        inner.set_state(ConnectionState::Disconnected);
    }

    /// Returns `true` while the primary connection is up and listening.
    #[must_use]
    pub fn communication_active(&self) -> bool {
        self.inner
            .primary()
            .is_some_and(|connection| !connection.is_closed())
    }

    /// Returns the connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.read().clone()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Sets the value of an action.
    ///
    /// For rollershutters `value` is a position (0-100) or one of the motor
    /// commands of [`ShutterCommand`]; the command goes through the position
    /// estimator. For other actions it must be 0-100.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActionNotFound` for unknown ids, `Error::Value` for
    /// invalid values and `Error::NotConnected` or a protocol error if the
    /// command cannot be sent.
    pub async fn execute_action(&self, id: &str, value: u8) -> Result<()> {
        check_id(id)?;
        let action = self
            .action(id)
            .ok_or_else(|| Error::ActionNotFound(id.to_string()))?;

        if let Some(shutter) = action.rollershutter() {
            let command = ShutterCommand::from_value(value)?;
            if !self.communication_active() {
                return Err(Error::NotConnected);
            }
            tracing::debug!(action = %id, ?command, "Rollershutter command");
            shutter.execute(command);
            return Ok(());
        }

        if value > 100 {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: 100,
                actual: i64::from(value),
            }
            .into());
        }
        self.inner
            .send(&Command::execute_action(action.numeric_id(), value))
            .await
    }

    /// Switches the program of a thermostat.
    ///
    /// # Errors
    ///
    /// Returns `Error::ThermostatNotFound` for unknown ids and
    /// `Error::NotConnected` or a protocol error if the command cannot be sent.
    pub async fn execute_thermostat(&self, id: &str, mode: ThermostatMode) -> Result<()> {
        let thermostat = self.find_thermostat(id)?;
        self.inner
            .send(&Command::thermostat_mode(thermostat.numeric_id(), mode))
            .await
    }

    /// Overrules the setpoint of a thermostat for `minutes`.
    ///
    /// `minutes == 0` ends a running overrule.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` if the setpoint is outside -50 to 100 degrees
    /// or the time exceeds 23:59, plus the errors of
    /// [`execute_thermostat`](Self::execute_thermostat).
    pub async fn execute_thermostat_overrule(
        &self,
        id: &str,
        setpoint: f64,
        minutes: u16,
    ) -> Result<()> {
        let thermostat = self.find_thermostat(id)?;
        let duration = OverruleTime::from_minutes(minutes)?;
        let tenths = to_tenths(setpoint);
        let degrees = i64::from(tenths / 10);
        if !setpoint.is_finite() || !(MIN_SETPOINT..=MAX_SETPOINT).contains(&degrees) {
            return Err(ValueError::OutOfRange {
                min: MIN_SETPOINT,
                max: MAX_SETPOINT,
                actual: degrees,
            }
            .into());
        }
        self.inner
            .send(&Command::thermostat_overrule(
                thermostat.numeric_id(),
                tenths,
                duration,
            ))
            .await
    }

    /// Reads new buckets of a meter and updates its totals.
    ///
    /// The first read covers everything since the meter's reference date;
    /// later reads only what is new. Meters without a reference date and
    /// malformed series are skipped without error.
    ///
    /// # Errors
    ///
    /// Returns `Error::MeterNotFound` for unknown ids and a protocol error if
    /// the metering connection fails.
    pub async fn execute_meter(&self, id: &str) -> Result<()> {
        let meter = self.find_meter(id)?;
        let tz = self.timezone();
        let _read = self.inner.meter_reads.lock().await;

        let previous = meter.reading();
        let (start, initial) = match (previous, meter.reference_date()) {
            (Some(previous), _) => (previous.end - Duration::minutes(BUCKET_MINUTES), false),
            (None, Some(reference)) => (reference, true),
            (None, None) => {
                tracing::debug!(meter = %id, "No reference date, skipping read");
                return Ok(());
            }
        };

        let window = EnergyWindow::until(start, Utc::now());
        if window.is_empty() || previous.is_some_and(|previous| window.end() <= previous.end) {
            tracing::trace!(meter = %id, "No new buckets");
            return Ok(());
        }

        let reply = self
            .inner
            .metering_request(&Command::energy_data(meter.channel(), &window, &tz))
            .await?;

        let Payload::Series(series) = reply.payload() else {
            match reply.error_code() {
                Some(code) if code != 0 => {
                    tracing::warn!(meter = %id, code, "Controller rejected energy read");
                    return Err(ProtocolError::Rejected(code).into());
                }
                _ => {
                    tracing::debug!(meter = %id, shape = reply.payload().shape(), "Unexpected energy reply");
                    return Ok(());
                }
            }
        };

        match meter.record_series(window.end(), series, initial, &tz) {
            Ok(reading) => {
                tracing::debug!(meter = %id, total = reading.total, day = reading.day, "Meter read");
                self.inner.dispatcher.callbacks().dispatch_meter(&meter);
            }
            Err(e) => tracing::debug!(meter = %id, error = %e, "Dropping malformed energy series"),
        }
        Ok(())
    }

    /// Asks the controller to (re)start live pushes for a meter.
    ///
    /// Live pushes stop after a while, so this has to be repeated.
    ///
    /// # Errors
    ///
    /// Returns `Error::MeterNotFound` for unknown ids and
    /// `Error::NotConnected` or a protocol error if the command cannot be sent.
    pub async fn retrigger_meter_live(&self, id: &str) -> Result<()> {
        let meter = self.find_meter(id)?;
        self.inner
            .send(&Command::GetLive {
                channel: meter.channel(),
            })
            .await
    }

    /// Stops live pushes for a meter.
    ///
    /// # Errors
    ///
    /// Same as [`retrigger_meter_live`](Self::retrigger_meter_live).
    pub async fn stop_meter_live(&self, id: &str) -> Result<()> {
        let meter = self.find_meter(id)?;
        self.inner
            .send(&Command::StopLive {
                channel: meter.channel(),
            })
            .await
    }

    /// Sets the instant a meter accumulates from and restarts its totals.
    ///
    /// # Errors
    ///
    /// Returns `Error::MeterNotFound` for unknown ids.
    pub fn set_meter_reference_date(&self, id: &str, reference: DateTime<Utc>) -> Result<()> {
        self.find_meter(id)?.set_reference_date(reference);
        Ok(())
    }

    // =========================================================================
    // Entity access
    // =========================================================================

    /// Returns all actions.
    #[must_use]
    pub fn actions(&self) -> Vec<Arc<Action>> {
        self.inner.dispatcher.cache().actions()
    }

    /// Returns an action by id.
    #[must_use]
    pub fn action(&self, id: &str) -> Option<Arc<Action>> {
        self.inner.dispatcher.cache().action(id)
    }

    /// Returns all thermostats.
    #[must_use]
    pub fn thermostats(&self) -> Vec<Arc<Thermostat>> {
        self.inner.dispatcher.cache().thermostats()
    }

    /// Returns a thermostat by id.
    #[must_use]
    pub fn thermostat(&self, id: &str) -> Option<Arc<Thermostat>> {
        self.inner.dispatcher.cache().thermostat(id)
    }

    /// Returns all meters.
    #[must_use]
    pub fn meters(&self) -> Vec<Arc<Meter>> {
        self.inner.dispatcher.cache().meters()
    }

    /// Returns a meter by id (its channel number).
    #[must_use]
    pub fn meter(&self, id: &str) -> Option<Arc<Meter>> {
        self.inner.dispatcher.cache().meter(id)
    }

    /// Returns all locations.
    #[must_use]
    pub fn locations(&self) -> Vec<Location> {
        self.inner.dispatcher.cache().location_list()
    }

    /// Returns the controller metadata from the last bootstrap.
    #[must_use]
    pub fn system_info(&self) -> Option<Arc<SystemInfo>> {
        self.inner.dispatcher.cache().system_info()
    }

    /// Returns the time zone controller timestamps are interpreted in.
    #[must_use]
    pub fn timezone(&self) -> ControllerTimeZone {
        self.inner.dispatcher.timezone()
    }

    fn find_thermostat(&self, id: &str) -> Result<Arc<Thermostat>> {
        check_id(id)?;
        self.thermostat(id)
            .ok_or_else(|| Error::ThermostatNotFound(id.to_string()))
    }

    fn find_meter(&self, id: &str) -> Result<Arc<Meter>> {
        check_id(id)?;
        self.meter(id)
            .ok_or_else(|| Error::MeterNotFound(id.to_string()))
    }
}

/// The controller addresses every entity by an unsigned integer.
fn check_id(id: &str) -> std::result::Result<(), ValueError> {
    id.parse::<u32>()
        .map(drop)
        .map_err(|_| ValueError::InvalidId(id.to_string()))
}

impl Subscribable for Controller {
    fn on_online<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.dispatcher.callbacks().on_online(callback)
    }

    fn on_offline<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OfflineReason) + Send + Sync + 'static,
    {
        self.inner.dispatcher.callbacks().on_offline(callback)
    }

    fn on_alarm<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.dispatcher.callbacks().on_alarm(callback)
    }

    fn on_notice<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.dispatcher.callbacks().on_notice(callback)
    }

    fn on_action_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        self.inner.dispatcher.callbacks().on_action_changed(callback)
    }

    fn on_thermostat_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Thermostat) + Send + Sync + 'static,
    {
        self.inner
            .dispatcher
            .callbacks()
            .on_thermostat_changed(callback)
    }

    fn on_meter_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Meter) + Send + Sync + 'static,
    {
        self.inner.dispatcher.callbacks().on_meter_changed(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.callbacks().unsubscribe(id)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("peer", &self.inner.peer())
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.inner.abort_reconnect();
        for worker in self.inner.workers.lock().drain(..) {
            worker.abort();
        }
    }
}

// =============================================================================
// Connection management
// =============================================================================

impl Inner {
    fn peer(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn primary(&self) -> Option<Arc<Connection>> {
        self.primary.read().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        tracing::debug!(?state, "Connection state");
        *self.state.write() = state;
    }

    /// Starts the tasks that send estimator commands and watch for lost
    /// connections. Runs once per controller.
    fn ensure_workers(self: &Arc<Self>) {
        let Some((requests, losses)) = self.receivers.lock().take() else {
            return;
        };
        let mut workers = self.workers.lock();
        workers.push(tokio::spawn(forward_requests(Arc::downgrade(self), requests)));
        workers.push(tokio::spawn(watch_losses(Arc::downgrade(self), losses)));
    }

    /// Opens the primary connection and runs the bootstrap sequence.
    ///
    /// Must be called with the lifecycle lock held.
    async fn establish(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        self.close_connections().await;

        let connection = self.connect().await?;
        *self.primary.write() = Some(connection);
        self.set_state(ConnectionState::Connected);
        tracing::info!(peer = %self.peer(), "Controller online");
        self.dispatcher.callbacks().dispatch_online();
        Ok(())
    }

    async fn connect(&self) -> Result<Arc<Connection>> {
        let config = &self.config;
        let connection = Connection::open(
            &config.host,
            config.port,
            config.io_timeout,
            config.correlation_timeout,
        )
        .await?;

        for command in Command::bootstrap_sequence() {
            let reply = connection.exchange(&command).await?;
            if reply.command() != Some(command.name()) {
                tracing::debug!(cmd = command.name(), reply = ?reply.tag(), "Unexpected bootstrap reply");
            }
            self.dispatcher.dispatch(&reply);
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let dispatcher = Arc::clone(&self.dispatcher);
        let losses = self.losses.clone();
        connection
            .spawn_listener(
                move |message| dispatcher.dispatch(&message),
                move |error| {
                    if losses.send(Loss { generation, error }).is_err() {
                        tracing::debug!("Controller dropped, ignoring connection loss");
                    }
                },
            )
            .await?;
        Ok(Arc::new(connection))
    }

    /// Closes both connections. Losses reported by them are ignored.
    async fn close_connections(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let primary = self.primary.write().take();
        if let Some(connection) = primary {
            connection.close().await;
        }
        let metering = self.metering.lock().await.take();
        if let Some(connection) = metering {
            connection.close().await;
        }
    }

    fn abort_reconnect(&self) {
        if let Some(task) = self.reconnect.lock().take() {
            task.abort();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.config.reconnection.should_retry(0) {
            self.set_state(ConnectionState::Failed("reconnection disabled".into()));
            return;
        }
        self.set_state(ConnectionState::Reconnecting { attempt: 1 });
        let task = tokio::spawn(reconnect(Arc::downgrade(self)));
        if let Some(previous) = self.reconnect.lock().replace(task) {
            previous.abort();
        }
    }

    async fn on_connection_lost(self: &Arc<Self>, loss: Loss) {
        let _guard = self.lifecycle.lock().await;
        if !self.active.load(Ordering::Acquire)
            || loss.generation != self.generation.load(Ordering::Acquire)
        {
            tracing::debug!(error = %loss.error, "Ignoring loss of a replaced connection");
            return;
        }

        tracing::error!(peer = %self.peer(), error = %loss.error, "Controller connection lost");
        self.close_connections().await;
        self.dispatcher
            .callbacks()
            .dispatch_offline(&OfflineReason::CommunicationError(loss.error.to_string()));
        self.schedule_reconnect();
    }

    /// Replaces `failed` with a fresh connection, unless that already happened.
    ///
    /// Reports the controller offline when `failed` is still the primary
    /// connection, since its listener's loss is then never handled.
    async fn restart(
        &self,
        failed: &Arc<Connection>,
        cause: &ProtocolError,
    ) -> Result<Arc<Connection>> {
        let _guard = self.lifecycle.lock().await;
        if !self.active.load(Ordering::Acquire) {
            return Err(Error::NotConnected);
        }
        match self.primary() {
            Some(current) if Arc::ptr_eq(&current, failed) => {
                tracing::error!(peer = %self.peer(), error = %cause, "Controller connection lost");
                self.dispatcher
                    .callbacks()
                    .dispatch_offline(&OfflineReason::CommunicationError(cause.to_string()));
            }
            Some(current) if !current.is_closed() => return Ok(current),
            _ => {}
        }
        self.abort_reconnect();
        self.establish().await?;
        self.primary().ok_or(Error::NotConnected)
    }

    /// Takes the controller offline until the collaborator starts it again.
    async fn give_up(&self, reason: OfflineReason) {
        let _guard = self.lifecycle.lock().await;
        self.active.store(false, Ordering::Release);
        self.abort_reconnect();
        self.close_connections().await;
        self.set_state(ConnectionState::Failed(reason.detail().to_string()));
        self.dispatcher.callbacks().dispatch_offline(&reason);
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Sends a correlated command on the primary connection.
    ///
    /// A failed write reconnects and retries once; a second failure takes the
    /// controller offline.
    async fn send(&self, command: &Command) -> Result<()> {
        let connection = self.primary().ok_or(Error::NotConnected)?;
        let Err(first) = connection.send(command, true).await else {
            return Ok(());
        };
        tracing::warn!(cmd = command.name(), error = %first, "Send failed, reconnecting");

        let retried = match self.restart(&connection, &first).await {
            Ok(connection) => connection.send(command, true).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        if let Err(e) = &retried {
            tracing::error!(cmd = command.name(), error = %e, "Send failed after reconnect");
            self.give_up(OfflineReason::SendFailed(e.to_string())).await;
        }
        retried
    }

    /// Runs a request on the metering connection, opening it if needed.
    ///
    /// A failed connection is dropped and reopened by the next request.
    async fn metering_request(&self, command: &Command) -> Result<crate::protocol::Message> {
        if !self.active.load(Ordering::Acquire) {
            return Err(Error::NotConnected);
        }
        let mut slot = self.metering.lock().await;
        let connection = match slot.take() {
            Some(connection) if !connection.is_closed() => connection,
            stale => {
                if let Some(connection) = stale {
                    connection.close().await;
                }
                self.open_metering().await?
            }
        };

        match connection.request(command).await {
            Ok(reply) => {
                *slot = Some(connection);
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(cmd = command.name(), error = %e, "Metering request failed");
                connection.close().await;
                Err(e.into())
            }
        }
    }

    async fn open_metering(&self) -> Result<Connection> {
        let config = &self.config;
        let connection = Connection::open(
            &config.host,
            config.port,
            config.io_timeout,
            config.correlation_timeout,
        )
        .await?;
        connection
            .spawn_listener(
                |message| tracing::trace!(tag = ?message.tag(), "Metering connection message"),
                |error| tracing::debug!(error = %error, "Metering connection closed"),
            )
            .await?;
        tracing::debug!(peer = %connection.peer(), "Metering connection open");
        Ok(connection)
    }
}

// =============================================================================
// Background tasks
// =============================================================================

/// Sends the motor commands produced by rollershutter estimators.
async fn forward_requests(inner: Weak<Inner>, mut requests: mpsc::UnboundedReceiver<ActionRequest>) {
    while let Some(request) = requests.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let command = Command::execute_action(request.id, request.value);
        if let Err(e) = inner.send(&command).await {
            tracing::warn!(action = request.id, value = request.value, error = %e, "Rollershutter command not sent");
        }
    }
}

async fn watch_losses(inner: Weak<Inner>, mut losses: mpsc::UnboundedReceiver<Loss>) {
    while let Some(loss) = losses.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.on_connection_lost(loss).await;
    }
}

/// Reconnects with backoff until it succeeds, the policy gives up or
/// communication is stopped.
async fn reconnect(inner: Weak<Inner>) {
    let mut attempt = 0;
    loop {
        let delay = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let policy = &inner.config.reconnection;
            if !policy.should_retry(attempt) {
                tracing::error!(peer = %inner.peer(), attempts = attempt, "Giving up reconnecting");
                inner.set_state(ConnectionState::Failed(format!(
                    "no connection after {attempt} attempts"
                )));
                return;
            }
            inner.set_state(ConnectionState::Reconnecting {
                attempt: attempt + 1,
            });
            policy.delay_for_attempt(attempt)
        };
        tokio::time::sleep(delay).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let _guard = inner.lifecycle.lock().await;
        if !inner.active.load(Ordering::Acquire) {
            return;
        }
        tracing::info!(peer = %inner.peer(), attempt = attempt + 1, "Reconnecting");
        match inner.establish().await {
            Ok(()) => return,
            Err(e) => tracing::warn!(attempt = attempt + 1, error = %e, "Reconnection failed"),
        }
        attempt += 1;
    }
}
