// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command/reply correlation for one connection.
//!
//! The controller answers requests in order and carries no request id, so a
//! connection allows a single unacknowledged command at a time. Before a new
//! command goes out, the sender waits for the previous one to be answered
//! (any envelope tagged with `cmd`) or for the correlation timeout to pass.
//! A timed out wait is logged as a probable failure and the send proceeds.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{MutexGuard, oneshot};

use super::codec::Message;

/// How a pending command ended.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// A `cmd` envelope arrived.
    Acknowledged(Message),
    /// The connection went away before an answer arrived.
    Failed,
}

/// Result of waiting for the previous command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Nothing was pending.
    Idle,
    /// The previous command was answered.
    Acknowledged,
    /// The connection failed while waiting.
    Failed,
    /// No answer within the correlation timeout.
    TimedOut,
}

/// Receiving side of one pending command.
pub(crate) type Ticket = oneshot::Receiver<Resolution>;

/// Single-slot correlation state of one connection.
#[derive(Debug)]
pub(crate) struct Correlator {
    timeout: Duration,
    /// Resolver of the command currently on the wire.
    resolver: Mutex<Option<oneshot::Sender<Resolution>>>,
    /// Ticket the next sender waits on.
    pending: Mutex<Option<Ticket>>,
    send_lock: tokio::sync::Mutex<()>,
}

impl Correlator {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            resolver: Mutex::new(None),
            pending: Mutex::new(None),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Serializes senders on this connection.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.send_lock.lock().await
    }

    /// Waits until the previously sent command is answered.
    ///
    /// Gives up after the correlation timeout.
    pub(crate) async fn await_previous(&self) -> Outcome {
        let Some(ticket) = self.pending.lock().take() else {
            return Outcome::Idle;
        };

        match tokio::time::timeout(self.timeout, ticket).await {
            Ok(Ok(Resolution::Acknowledged(_))) => Outcome::Acknowledged,
            Ok(Ok(Resolution::Failed) | Err(_)) => Outcome::Failed,
            Err(_) => {
                // Safe: the correlation timeout is a few seconds
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::warn!(
                    timeout_ms,
                    "No reply to previous command, probable failure; sending anyway"
                );
                // Drop the stale resolver so a late reply does not release the next command
                self.resolver.lock().take();
                Outcome::TimedOut
            }
        }
    }

    /// Marks a new command as in flight; the next sender waits for it.
    pub(crate) fn arm(&self) {
        let ticket = self.arm_ticket();
        *self.pending.lock() = Some(ticket);
    }

    /// Marks a new command as in flight and hands its ticket to the caller.
    pub(crate) fn arm_ticket(&self) -> Ticket {
        let (tx, rx) = oneshot::channel();
        *self.resolver.lock() = Some(tx);
        rx
    }

    /// Resolves the pending command with a `cmd` envelope.
    ///
    /// Returns `false` if nothing was pending.
    pub(crate) fn resolve(&self, message: &Message) -> bool {
        match self.resolver.lock().take() {
            Some(tx) => {
                let _ = tx.send(Resolution::Acknowledged(message.clone()));
                true
            }
            None => false,
        }
    }

    /// Fails the pending command, releasing anyone waiting on it.
    pub(crate) fn fail(&self) {
        if let Some(tx) = self.resolver.lock().take() {
            let _ = tx.send(Resolution::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;
    use crate::protocol::decode;

    fn ack() -> Message {
        decode(r#"{"cmd":"executeactions","data":{"error":0}}"#).unwrap()
    }

    #[tokio::test]
    async fn nothing_pending_is_idle() {
        let correlator = Correlator::new(Duration::from_millis(2000));
        assert_eq!(correlator.await_previous().await, Outcome::Idle);
    }

    #[tokio::test]
    async fn reply_releases_next_send() {
        let correlator = Correlator::new(Duration::from_millis(2000));
        correlator.arm();
        assert!(correlator.resolve(&ack()));
        assert_eq!(correlator.await_previous().await, Outcome::Acknowledged);
        // The slot is free again
        assert!(!correlator.resolve(&ack()));
    }

    #[tokio::test(start_paused = true)]
    async fn second_send_waits_for_timeout() {
        let correlator = Correlator::new(Duration::from_millis(2000));
        correlator.arm();

        let started = Instant::now();
        assert_eq!(correlator.await_previous().await, Outcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_during_wait_releases_early() {
        let correlator = Arc::new(Correlator::new(Duration::from_millis(2000)));
        correlator.arm();

        let waiter = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move {
                let started = Instant::now();
                let outcome = correlator.await_previous().await;
                (outcome, started.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        correlator.resolve(&ack());

        let (outcome, waited) = waiter.await.unwrap();
        assert_eq!(outcome, Outcome::Acknowledged);
        assert!(waited < Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn fail_unblocks_waiter() {
        let correlator = Correlator::new(Duration::from_millis(2000));
        correlator.arm();
        correlator.fail();
        assert_eq!(correlator.await_previous().await, Outcome::Failed);
    }

    #[tokio::test]
    async fn ticket_carries_reply() {
        let correlator = Correlator::new(Duration::from_millis(2000));
        let ticket = correlator.arm_ticket();
        correlator.resolve(&ack());
        match ticket.await.unwrap() {
            Resolution::Acknowledged(msg) => assert_eq!(msg.command(), Some("executeactions")),
            Resolution::Failed => panic!("expected acknowledgement"),
        }
    }
}
