// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests against a scripted controller on a loopback socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use nhc_lib::controller::{ConnectionState, Controller, ControllerConfig, ReconnectionPolicy};
use nhc_lib::rollershutter::ShutterPhase;
use nhc_lib::subscription::Subscribable;
use nhc_lib::{Error, ThermostatMode};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Line that makes the fake controller drop its event connections.
const HANG_UP: &str = "__hang_up__";

// ============================================================================
// Fake controller
// ============================================================================

struct FakeController {
    port: u16,
    received: mpsc::UnboundedReceiver<Value>,
    pushes: broadcast::Sender<String>,
    connections: Arc<AtomicU32>,
    faults: Arc<Faults>,
}

/// Misbehaviour switched on by individual tests.
#[derive(Default)]
struct Faults {
    /// Hang up without answering the next command with this name.
    hang_up_on: Mutex<Option<String>>,
    /// Close new connections straight away.
    refuse: AtomicBool,
    refused: AtomicU32,
}

impl FakeController {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (pushes, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicU32::new(0));

        let faults = Arc::new(Faults::default());

        let push_tx = pushes.clone();
        let counter = connections.clone();
        let f = faults.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                if f.refuse.load(Ordering::SeqCst) {
                    f.refused.fetch_add(1, Ordering::SeqCst);
                    drop(socket);
                    continue;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    socket,
                    received_tx.clone(),
                    push_tx.subscribe(),
                    f.clone(),
                ));
            }
        });

        Self {
            port,
            received,
            pushes,
            connections,
            faults,
        }
    }

    fn config(&self) -> ControllerConfig {
        ControllerConfig::new("127.0.0.1")
            .with_port(self.port)
            .with_io_timeout(Duration::from_secs(2))
            .with_reconnection(
                ReconnectionPolicy::new()
                    .with_initial_delay(Duration::from_millis(50))
                    .with_max_delay(Duration::from_millis(200)),
            )
    }

    fn push(&self, event: &Value) {
        self.pushes.send(event.to_string()).unwrap();
    }

    fn hang_up(&self) {
        self.pushes.send(HANG_UP.to_string()).unwrap();
    }

    fn hang_up_on(&self, cmd: &str) {
        *self.faults.hang_up_on.lock() = Some(cmd.to_string());
    }

    fn refuse_connections(&self) {
        self.faults.refuse.store(true, Ordering::SeqCst);
    }

    /// Returns the next received command named `cmd`, skipping others.
    async fn expect(&mut self, cmd: &str) -> Value {
        timeout(WAIT, async {
            loop {
                let request = self.received.recv().await.unwrap();
                if request["cmd"] == cmd {
                    return request;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {cmd} received"))
    }

    fn drain(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(request) = self.received.try_recv() {
            names.push(request["cmd"].as_str().unwrap_or_default().to_string());
        }
        names
    }
}

async fn serve(
    socket: TcpStream,
    received: mpsc::UnboundedSender<Value>,
    mut pushes: broadcast::Receiver<String>,
    faults: Arc<Faults>,
) {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut events = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { return };
                let request: Value = serde_json::from_str(&line).unwrap();
                let _ = received.send(request.clone());
                let cmd = request["cmd"].as_str().unwrap_or_default();
                if faults.hang_up_on.lock().take_if(|name| name.as_str() == cmd).is_some() {
                    return;
                }
                if request["cmd"] == "startevents" {
                    events = true;
                }
                for reply in replies(&request) {
                    let mut out = reply.to_string();
                    out.push('\n');
                    if write.write_all(out.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
            push = pushes.recv() => {
                let push = match push {
                    Ok(push) => push,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                };
                if !events {
                    continue;
                }
                if push == HANG_UP {
                    return;
                }
                let out = format!("{push}\n");
                if write.write_all(out.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn ack(cmd: &str) -> Value {
    json!({"cmd": cmd, "data": {"error": "0"}})
}

fn replies(request: &Value) -> Vec<Value> {
    let cmd = request["cmd"].as_str().unwrap_or_default();
    match cmd {
        "systeminfo" => vec![json!({"cmd": "systeminfo", "data": {
            "swversion": "1.10.0.34", "api": "1.19", "language": "NL", "currency": "EUR",
            "units": "0", "TZ": "3600", "DST": "0", "lastconfig": "20240101000000"
        }})],
        "listlocations" => vec![json!({"cmd": "listlocations", "data": [
            {"id": "1", "name": "Kitchen"},
            {"id": "2", "name": "Living"}
        ]})],
        "listactions" => vec![json!({"cmd": "listactions", "data": [
            {"id": "1", "name": "Ceiling", "type": "1", "location": "1", "value1": "0"},
            {"id": "2", "name": "Spots", "type": "2", "location": "2", "value1": "50"},
            {"id": "3", "name": "Blinds", "type": "4", "location": "2", "value1": "0",
             "opentime": "1", "closetime": "1"}
        ]})],
        "listthermostat" => vec![json!({"cmd": "listthermostat", "data": [
            {"id": "0", "name": "Living", "location": "2", "measured": "195", "setpoint": "210",
             "overrule": "0", "overruletime": "00:00", "mode": "0", "ecosave": "0"}
        ]})],
        "listenergy" => vec![json!({"cmd": "listenergy", "data": [
            {"channel": "0", "name": "Main", "type": "0", "location": "1",
             "reference": "202401010000"}
        ]})],
        "listthermostatHVAC" | "readtariffdata" | "getalarms" => {
            vec![json!({"cmd": cmd, "data": []})]
        }
        "getenergydata" => vec![json!({"cmd": "getenergydata", "data": ["10", "10", "10"]})],
        "executeactions" => {
            let id = request["id"].as_u64().unwrap_or_default();
            let value = request["value1"].as_u64().unwrap_or_default();
            let mut out = vec![ack(cmd)];
            if value <= 100 {
                out.push(json!({"event": "listactions", "data": [
                    {"id": id.to_string(), "value1": value.to_string()}
                ]}));
            }
            out
        }
        _ => vec![ack(cmd)],
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn connected() -> (FakeController, Controller) {
    let fake = FakeController::start().await;
    let controller = Controller::new(fake.config());
    controller.start_communication().await.unwrap();
    (fake, controller)
}

// ============================================================================
// Bootstrap
// ============================================================================

mod bootstrap {
    use super::*;

    #[tokio::test]
    async fn runs_in_order_and_fills_the_cache() {
        let fake = FakeController::start().await;
        let controller = Controller::new(fake.config());
        let online = Arc::new(AtomicU32::new(0));
        let o = online.clone();
        controller.on_online(move || {
            o.fetch_add(1, Ordering::SeqCst);
        });

        controller.start_communication().await.unwrap();
        let mut fake = fake;

        assert_eq!(
            fake.drain(),
            vec![
                "systeminfo",
                "listlocations",
                "listactions",
                "listthermostat",
                "listthermostatHVAC",
                "listenergy",
                "readtariffdata",
                "getalarms",
                "startevents",
            ]
        );
        assert_eq!(online.load(Ordering::SeqCst), 1);
        assert!(controller.communication_active());
        assert_eq!(controller.connection_state(), ConnectionState::Connected);

        assert_eq!(controller.actions().len(), 3);
        assert_eq!(controller.action("1").unwrap().location(), "Kitchen");
        assert_eq!(controller.locations().len(), 2);
        assert_eq!(controller.thermostat("0").unwrap().name(), "Living");
        assert_eq!(controller.meter("0").unwrap().name(), "Main");
        assert_eq!(controller.system_info().unwrap().api, "1.19");
    }

    #[tokio::test]
    async fn unreachable_controller_goes_offline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let controller = Controller::new(
            ControllerConfig::new("127.0.0.1")
                .with_port(port)
                .with_reconnection(ReconnectionPolicy::disabled()),
        );
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = reasons.clone();
        controller.on_offline(move |reason| r.lock().push(reason.key()));

        assert!(controller.start_communication().await.is_err());
        assert_eq!(*reasons.lock(), vec!["offline.communication-error"]);
        assert!(controller.connection_state().is_failed());
        assert!(!controller.communication_active());
    }

    #[tokio::test]
    async fn empty_host_is_a_configuration_error() {
        let controller = Controller::new(ControllerConfig::new(""));
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = reasons.clone();
        controller.on_offline(move |reason| r.lock().push(reason.key()));

        assert!(controller.start_communication().await.is_err());
        assert_eq!(*reasons.lock(), vec!["offline.configuration-error"]);
    }
}

// ============================================================================
// Commands and events
// ============================================================================

mod commands {
    use super::*;

    #[tokio::test]
    async fn execute_action_round_trip() {
        let (mut fake, controller) = connected().await;
        let changes = Arc::new(AtomicU32::new(0));
        let c = changes.clone();
        controller.on_action_changed(move |action| {
            assert_eq!(action.id(), "1");
            c.fetch_add(1, Ordering::SeqCst);
        });

        controller.execute_action("1", 100).await.unwrap();

        let request = fake.expect("executeactions").await;
        assert_eq!(request, json!({"cmd": "executeactions", "id": 1, "value1": 100}));
        let action = controller.action("1").unwrap();
        eventually(|| action.state() == 100).await;
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pushed_events_update_the_same_instance() {
        let (fake, controller) = connected().await;
        let spots = controller.action("2").unwrap();

        fake.push(&json!({"event": "listactions", "data": [{"id": "2", "value1": "75"}]}));
        eventually(|| spots.state() == 75).await;

        assert!(Arc::ptr_eq(&spots, &controller.action("2").unwrap()));
        assert_eq!(controller.actions().len(), 3);
    }

    #[tokio::test]
    async fn alarm_and_notice_events() {
        let (fake, controller) = connected().await;
        let texts = Arc::new(Mutex::new(Vec::new()));
        let a = texts.clone();
        let n = texts.clone();
        controller.on_alarm(move |text| a.lock().push(format!("alarm: {text}")));
        controller.on_notice(move |text| n.lock().push(format!("notice: {text}")));

        fake.push(&json!({"event": "getalarms", "data": {"type": "0", "text": "Fire"}}));
        fake.push(&json!({"event": "getalarms", "data": {"type": "1", "text": "Battery low"}}));

        eventually(|| texts.lock().len() == 2).await;
        assert_eq!(
            *texts.lock(),
            vec!["alarm: Fire".to_string(), "notice: Battery low".to_string()]
        );
    }

    #[tokio::test]
    async fn invalid_commands_are_rejected_locally() {
        let (_fake, controller) = connected().await;

        assert!(matches!(
            controller.execute_action("99", 100).await,
            Err(Error::ActionNotFound(_))
        ));
        assert!(matches!(
            controller.execute_action("lamp", 100).await,
            Err(Error::Value(nhc_lib::ValueError::InvalidId(_)))
        ));
        assert!(matches!(
            controller.execute_action("1", 101).await,
            Err(Error::Value(_))
        ));
        assert!(matches!(
            controller.execute_action("3", 200).await,
            Err(Error::Value(_))
        ));
        assert!(matches!(
            controller.execute_thermostat("5", ThermostatMode::Eco).await,
            Err(Error::ThermostatNotFound(_))
        ));
        assert!(matches!(
            controller.execute_thermostat_overrule("0", 21.0, 24 * 60).await,
            Err(Error::Value(_))
        ));
        assert!(matches!(
            controller.execute_meter("7").await,
            Err(Error::MeterNotFound(_))
        ));
    }

    #[tokio::test]
    async fn thermostat_commands() {
        let (mut fake, controller) = connected().await;

        controller
            .execute_thermostat("0", ThermostatMode::Eco)
            .await
            .unwrap();
        assert_eq!(
            fake.expect("executethermostat").await,
            json!({"cmd": "executethermostat", "id": 0, "mode": 2})
        );

        controller
            .execute_thermostat_overrule("0", 21.5, 90)
            .await
            .unwrap();
        assert_eq!(
            fake.expect("executethermostat").await,
            json!({"cmd": "executethermostat", "id": 0, "overrule": 215, "overruletime": "01:30"})
        );
    }

    #[tokio::test]
    async fn meter_live_commands() {
        let (mut fake, controller) = connected().await;

        controller.retrigger_meter_live("0").await.unwrap();
        assert_eq!(fake.expect("getlive").await, json!({"cmd": "getlive", "channel": 0}));

        controller.stop_meter_live("0").await.unwrap();
        assert_eq!(fake.expect("stoplive").await, json!({"cmd": "stoplive", "channel": 0}));
    }

    #[tokio::test]
    async fn rollershutter_percentage_move() {
        let (mut fake, controller) = connected().await;
        let blinds = controller.action("3").unwrap();
        let shutter = blinds.rollershutter().unwrap().clone();

        // 50% at one second per full travel takes 500 ms
        controller.execute_action("3", 50).await.unwrap();

        let up = fake.expect("executeactions").await;
        assert_eq!(up["value1"], 255);
        assert_eq!(shutter.phase(), ShutterPhase::Moving);

        let stop = fake.expect("executeactions").await;
        assert_eq!(stop["value1"], 253);
        eventually(|| shutter.phase() == ShutterPhase::Idle).await;
        assert_eq!(blinds.state(), 50);
    }
}

// ============================================================================
// Metering
// ============================================================================

mod metering {
    use super::*;

    #[tokio::test]
    async fn initial_read_uses_a_second_connection() {
        let (mut fake, controller) = connected().await;
        let reads = Arc::new(AtomicU32::new(0));
        let r = reads.clone();
        controller.on_meter_changed(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        controller.execute_meter("0").await.unwrap();

        let request = fake.expect("getenergydata").await;
        assert_eq!(request["channel"], 0);
        assert_eq!(request["start"], "202401010000");
        assert_eq!(fake.connections.load(Ordering::SeqCst), 2);

        let meter = controller.meter("0").unwrap();
        assert_eq!(meter.total(), Some(30.0));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlapping_reads_count_buckets_once() {
        let (mut fake, controller) = connected().await;
        let reads = Arc::new(AtomicU32::new(0));
        let r = reads.clone();
        controller.on_meter_changed(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        let (first, second) = tokio::join!(controller.execute_meter("0"), controller.execute_meter("0"));
        first.unwrap();
        second.unwrap();

        fake.expect("getenergydata").await;
        sleep(Duration::from_millis(100)).await;
        assert!(!fake.drain().iter().any(|cmd| cmd == "getenergydata"));
        assert_eq!(controller.meter("0").unwrap().total(), Some(30.0));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn future_reference_reads_nothing() {
        let (mut fake, controller) = connected().await;
        let meter = controller.meter("0").unwrap();
        controller
            .set_meter_reference_date("0", chrono::Utc::now() + chrono::Duration::days(1))
            .unwrap();

        controller.execute_meter("0").await.unwrap();

        assert!(!fake.drain().iter().any(|cmd| cmd == "getenergydata"));
        assert_eq!(meter.total(), None);
        assert_eq!(fake.connections.load(Ordering::SeqCst), 1);
    }
}

// ============================================================================
// Connection lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn lost_connection_reconnects() {
        let (fake, controller) = connected().await;
        let online = Arc::new(AtomicU32::new(0));
        let offline = Arc::new(Mutex::new(Vec::new()));
        let on = online.clone();
        let off = offline.clone();
        controller.on_online(move || {
            on.fetch_add(1, Ordering::SeqCst);
        });
        controller.on_offline(move |reason| off.lock().push(reason.key()));
        let ceiling = controller.action("1").unwrap();

        fake.hang_up();

        eventually(|| online.load(Ordering::SeqCst) == 1).await;
        assert_eq!(*offline.lock(), vec!["offline.communication-error"]);
        assert_eq!(controller.connection_state(), ConnectionState::Connected);
        assert!(fake.connections.load(Ordering::SeqCst) >= 2);
        // Entities survive a reconnect
        assert!(Arc::ptr_eq(&ceiling, &controller.action("1").unwrap()));
    }

    #[tokio::test]
    async fn failed_send_is_retried_once_on_a_new_connection() {
        let (mut fake, controller) = connected().await;
        let online = Arc::new(AtomicU32::new(0));
        let offline = Arc::new(Mutex::new(Vec::new()));
        let on = online.clone();
        let off = offline.clone();
        controller.on_online(move || {
            on.fetch_add(1, Ordering::SeqCst);
        });
        controller.on_offline(move |reason| off.lock().push(reason.key()));

        // The first command is never answered: the controller hangs up
        fake.hang_up_on("executeactions");
        controller.execute_action("1", 100).await.unwrap();
        controller.execute_action("2", 20).await.unwrap();

        assert_eq!(fake.expect("executeactions").await["id"], 1);
        let resent = fake.expect("executeactions").await;
        assert_eq!(resent, json!({"cmd": "executeactions", "id": 2, "value1": 20}));

        sleep(Duration::from_millis(300)).await;
        assert!(!fake.drain().iter().any(|cmd| cmd == "executeactions"));
        assert_eq!(fake.connections.load(Ordering::SeqCst), 2);
        assert_eq!(*offline.lock(), vec!["offline.communication-error"]);
        assert_eq!(online.load(Ordering::SeqCst), 1);
        assert_eq!(controller.connection_state(), ConnectionState::Connected);
        assert_eq!(controller.action("2").unwrap().state(), 20);
    }

    #[tokio::test]
    async fn second_send_failure_goes_offline_for_good() {
        let (fake, controller) = connected().await;
        let offline = Arc::new(Mutex::new(Vec::new()));
        let off = offline.clone();
        controller.on_offline(move |reason| off.lock().push(reason.key()));

        fake.hang_up_on("executeactions");
        fake.refuse_connections();
        controller.execute_action("1", 100).await.unwrap();
        assert!(controller.execute_action("2", 20).await.is_err());

        assert_eq!(
            *offline.lock(),
            vec!["offline.communication-error", "offline.send-failed"]
        );
        assert!(controller.connection_state().is_failed());
        assert!(!controller.communication_active());

        // No reconnection is attempted afterwards
        let attempts = fake.faults.refused.load(Ordering::SeqCst);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(fake.faults.refused.load(Ordering::SeqCst), attempts);
        assert!(controller.connection_state().is_failed());
        assert!(matches!(
            controller.execute_action("1", 0).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn stop_and_reset() {
        let (_fake, controller) = connected().await;
        let before = controller.action("1").unwrap();

        controller.stop_communication().await;
        controller.stop_communication().await;
        assert!(!controller.communication_active());
        assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
        assert!(matches!(
            controller.execute_action("1", 100).await,
            Err(Error::NotConnected)
        ));
        // The cache stays readable while stopped
        assert_eq!(controller.actions().len(), 3);

        controller.reset_communication().await.unwrap();
        assert!(controller.communication_active());
        let after = controller.action("1").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
