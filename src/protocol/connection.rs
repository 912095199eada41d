// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One line-oriented TCP session with the controller.
//!
//! A session starts in request/reply mode: [`Connection::exchange`] writes a
//! request and reads lines until one decodes, under the I/O timeout. Once
//! [`Connection::spawn_listener`] has been called the read half belongs to a
//! background task, every decoded line goes to a callback and `cmd` replies
//! release the [`Correlator`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::codec::{Message, decode, encode};
use super::correlator::{Correlator, Outcome, Resolution};
use crate::command::Command;
use crate::error::ProtocolError;

type LineReader = BufReader<OwnedReadHalf>;

/// Longest line accepted from the controller, newline included.
const MAX_LINE_BYTES: u64 = 1024 * 1024;

/// A TCP session speaking the controller's line protocol.
#[derive(Debug)]
pub(crate) struct Connection {
    peer: String,
    writer: Mutex<OwnedWriteHalf>,
    reader: Mutex<Option<LineReader>>,
    correlator: Arc<Correlator>,
    closed: Arc<AtomicBool>,
    io_timeout: Duration,
    listener: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Opens a session to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::ConnectionFailed` if the socket cannot be
    /// opened and `ProtocolError::Timeout` if connecting takes longer than
    /// `io_timeout`.
    pub(crate) async fn open(
        host: &str,
        port: u16,
        io_timeout: Duration,
        correlation_timeout: Duration,
    ) -> Result<Self, ProtocolError> {
        let peer = format!("{host}:{port}");
        tracing::debug!(peer = %peer, "Opening controller connection");

        let stream = within(io_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|e| match e {
                ProtocolError::Io(io) => ProtocolError::ConnectionFailed(format!("{peer}: {io}")),
                other => other,
            })?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();

        Ok(Self {
            peer,
            writer: Mutex::new(write),
            reader: Mutex::new(Some(BufReader::new(read))),
            correlator: Arc::new(Correlator::new(correlation_timeout)),
            closed: Arc::new(AtomicBool::new(false)),
            io_timeout,
            listener: parking_lot::Mutex::new(None),
        })
    }

    /// Returns `host:port` of the controller.
    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    /// Returns `true` once the session was closed or its listener failed.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes a request and reads its reply directly from the socket.
    ///
    /// Only valid before [`spawn_listener`](Self::spawn_listener). Lines that
    /// do not decode are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Timeout` if no decodable line arrives within
    /// the I/O timeout, and `ProtocolError::Io` on socket failure.
    pub(crate) async fn exchange(&self, command: &Command) -> Result<Message, ProtocolError> {
        let _guard = self.correlator.lock().await;
        self.write(command).await?;

        let mut reader = self.reader.lock().await;
        let reader = reader.as_mut().ok_or(ProtocolError::Closed)?;
        let deadline = Instant::now() + self.io_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(line) = within(remaining, read_line(reader)).await? else {
                tracing::warn!(peer = %self.peer, limit = MAX_LINE_BYTES, "Skipping oversized line");
                continue;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracing::trace!(peer = %self.peer, line, "<-");
            match decode(line) {
                Ok(message) => return Ok(message),
                Err(e) => tracing::warn!(peer = %self.peer, error = %e, "Skipping undecodable line"),
            }
        }
    }

    /// Sends a request without waiting for its reply.
    ///
    /// With `correlate`, the send first waits for the previous correlated
    /// command to be answered (or for the correlation timeout).
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Closed` if the session is closed and
    /// `ProtocolError::Io` or `ProtocolError::Timeout` if the write fails.
    pub(crate) async fn send(&self, command: &Command, correlate: bool) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::Closed);
        }
        let _guard = self.correlator.lock().await;
        if correlate {
            if self.correlator.await_previous().await == Outcome::Failed && self.is_closed() {
                return Err(ProtocolError::Closed);
            }
            self.correlator.arm();
        }
        self.write(command).await
    }

    /// Sends a correlated request and waits for its reply.
    ///
    /// The reply is delivered by the listener task, which must be running.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Timeout` if no reply arrives within the I/O
    /// timeout and `ProtocolError::Closed` if the session goes away first.
    pub(crate) async fn request(&self, command: &Command) -> Result<Message, ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::Closed);
        }
        let _guard = self.correlator.lock().await;
        self.correlator.await_previous().await;
        let ticket = self.correlator.arm_ticket();
        self.write(command).await?;

        match tokio::time::timeout(self.io_timeout, ticket).await {
            Ok(Ok(Resolution::Acknowledged(message))) => Ok(message),
            Ok(Ok(Resolution::Failed)) => Err(ProtocolError::Closed),
            Ok(Err(_)) => Err(ProtocolError::ChannelClosed(format!(
                "reply to {} was abandoned",
                command.name()
            ))),
            Err(_) => {
                self.correlator.fail();
                Err(ProtocolError::Timeout(millis(self.io_timeout)))
            }
        }
    }

    /// Hands the read half to a background task.
    ///
    /// `on_message` receives every decoded line. `on_failure` is called once
    /// if reading stops for any reason other than [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Closed` if a listener was already started.
    pub(crate) async fn spawn_listener<F, G>(
        &self,
        on_message: F,
        on_failure: G,
    ) -> Result<(), ProtocolError>
    where
        F: Fn(Message) + Send + Sync + 'static,
        G: FnOnce(ProtocolError) + Send + 'static,
    {
        let reader = self.reader.lock().await.take().ok_or(ProtocolError::Closed)?;
        let peer = self.peer.clone();
        let correlator = Arc::clone(&self.correlator);
        let closed = Arc::clone(&self.closed);

        let handle = tokio::spawn(async move {
            let error = listen(reader, &peer, &correlator, on_message).await;
            if closed.swap(true, Ordering::AcqRel) {
                tracing::debug!(peer = %peer, "Listener stopped");
            } else {
                correlator.fail();
                on_failure(error);
            }
        });
        *self.listener.lock() = Some(handle);
        Ok(())
    }

    /// Closes the session.
    ///
    /// Idempotent. Pending correlated sends are released as failed and close
    /// errors are ignored.
    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        self.correlator.fail();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            tracing::debug!(peer = %self.peer, error = %e, "Ignoring error on close");
        }
        tracing::debug!(peer = %self.peer, "Connection closed");
    }

    async fn write(&self, command: &Command) -> Result<(), ProtocolError> {
        let line = encode(command)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        tracing::trace!(peer = %self.peer, line = line.trim_end(), "->");
        let mut writer = self.writer.lock().await;
        within(self.io_timeout, writer.write_all(line.as_bytes())).await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

/// Reads lines until the socket fails, returning the failure.
async fn listen<F>(
    mut reader: LineReader,
    peer: &str,
    correlator: &Correlator,
    on_message: F,
) -> ProtocolError
where
    F: Fn(Message),
{
    loop {
        let line = match read_line(&mut reader).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::warn!(peer, limit = MAX_LINE_BYTES, "Dropping oversized line");
                continue;
            }
            Err(e) => return ProtocolError::Io(e),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tracing::trace!(peer, line, "<-");

        match decode(line) {
            Ok(message) => {
                if message.is_command() {
                    correlator.resolve(&message);
                }
                on_message(message);
            }
            Err(e) => tracing::warn!(peer, error = %e, "Dropping undecodable line"),
        }
    }
}

/// Reads one line. Returns `None` for a line longer than `MAX_LINE_BYTES`,
/// which is consumed up to its newline and dropped.
async fn read_line(reader: &mut LineReader) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Err(closed_by_peer());
    }
    if buf.last() == Some(&b'\n') || (buf.len() as u64) < MAX_LINE_BYTES {
        return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
    }

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(closed_by_peer());
        }
        if let Some(newline) = available.iter().position(|b| *b == b'\n') {
            reader.consume(newline + 1);
            return Ok(None);
        }
        let skipped = available.len();
        reader.consume(skipped);
    }
}

fn closed_by_peer() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "controller closed the connection",
    )
}

async fn within<T>(
    limit: Duration,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T, ProtocolError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ProtocolError::from),
        Err(_) => Err(ProtocolError::Timeout(millis(limit))),
    }
}

fn millis(duration: Duration) -> u64 {
    // Safe: configured timeouts are seconds, not centuries
    #[allow(clippy::cast_possible_truncation)]
    let ms = duration.as_millis() as u64;
    ms
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;

    const IO: Duration = Duration::from_secs(5);

    async fn pair(correlation: Duration) -> (Connection, tokio::net::TcpStream) {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let (conn, accepted) = tokio::join!(
            Connection::open("127.0.0.1", port, IO, correlation),
            server.accept()
        );
        (conn.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn exchange_skips_garbage() {
        let (conn, socket) = pair(Duration::from_secs(2)).await;
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();

        let server = tokio::spawn(async move {
            let request = lines.next_line().await.unwrap().unwrap();
            write
                .write_all(b"not json\n\n{\"cmd\":\"systeminfo\",\"data\":{\"api\":\"2\"}}\n")
                .await
                .unwrap();
            request
        });

        let reply = conn.exchange(&Command::SystemInfo).await.unwrap();
        assert_eq!(reply.command(), Some("systeminfo"));
        assert_eq!(server.await.unwrap(), r#"{"cmd":"systeminfo"}"#);
    }

    #[tokio::test]
    async fn second_send_waits_for_reply() {
        let (conn, socket) = pair(Duration::from_secs(3)).await;
        let conn = Arc::new(conn);
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();

        conn.spawn_listener(|_| {}, |_| {}).await.unwrap();

        let sender = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                conn.send(&Command::execute_action(1, 100), true).await.unwrap();
                conn.send(&Command::execute_action(2, 0), true).await.unwrap();
            })
        };

        let first = lines.next_line().await.unwrap().unwrap();
        assert!(first.contains("\"id\":1"));

        // No reply yet: the second command must not be on the wire
        let early = tokio::time::timeout(Duration::from_millis(300), lines.next_line()).await;
        assert!(early.is_err());

        write
            .write_all(b"{\"cmd\":\"executeactions\",\"data\":{\"error\":0}}\n")
            .await
            .unwrap();

        let second = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(second.contains("\"id\":2"));
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn listener_forwards_messages_and_reports_failure() {
        let (conn, mut socket) = pair(Duration::from_secs(2)).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (failure_tx, failure_rx) = tokio::sync::oneshot::channel();

        conn.spawn_listener(
            move |msg| {
                let _ = tx.send(msg);
            },
            move |err| {
                let _ = failure_tx.send(err.to_string());
            },
        )
        .await
        .unwrap();

        socket
            .write_all(b"{\"event\":\"listactions\",\"data\":[{\"id\":\"3\",\"value1\":\"20\"}]}\n{\"cmd\":\"x\",\"data\":\"bad\"}\n")
            .await
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event(), Some("listactions"));

        drop(socket);
        let reason = tokio::time::timeout(IO, failure_rx).await.unwrap().unwrap();
        assert!(reason.contains("closed"));
        assert!(conn.is_closed());
        // The undecodable line was dropped
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn oversized_line_is_dropped_without_closing() {
        let (conn, socket) = pair(Duration::from_secs(2)).await;
        let (_read, mut write) = socket.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let failed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failed);

        conn.spawn_listener(
            move |msg| {
                let _ = tx.send(msg);
            },
            move |_| flag.store(true, Ordering::SeqCst),
        )
        .await
        .unwrap();

        tokio::spawn(async move {
            let mut flood = vec![b'x'; usize::try_from(MAX_LINE_BYTES).unwrap() + 4096];
            flood.push(b'\n');
            write.write_all(&flood).await.unwrap();
            write
                .write_all(b"{\"event\":\"getlive\",\"data\":{\"channel\":\"1\",\"value\":\"5\"}}\n")
                .await
                .unwrap();
            // Keep the socket open until the test ends
            std::future::pending::<()>().await;
        });

        let msg = tokio::time::timeout(IO, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.event(), Some("getlive"));
        assert!(!conn.is_closed());
        assert!(!failed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_silent() {
        let (conn, _socket) = pair(Duration::from_secs(2)).await;
        let failed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&failed);
        conn.spawn_listener(|_| {}, move |_| flag.store(true, Ordering::SeqCst))
            .await
            .unwrap();

        conn.close().await;
        conn.close().await;

        assert!(conn.is_closed());
        assert!(!failed.load(Ordering::SeqCst));
        assert!(matches!(
            conn.send(&Command::ListActions, true).await,
            Err(ProtocolError::Closed)
        ));
    }

    #[tokio::test]
    async fn request_returns_reply() {
        let (conn, socket) = pair(Duration::from_secs(2)).await;
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        conn.spawn_listener(|_| {}, |_| {}).await.unwrap();

        tokio::spawn(async move {
            lines.next_line().await.unwrap();
            write
                .write_all(b"{\"cmd\":\"getenergydata\",\"data\":[\"1\",\"2\"]}\n")
                .await
                .unwrap();
            // Keep the socket open until the test ends
            lines.next_line().await.ok();
        });

        let reply = conn.request(&Command::GetLive { channel: 1 }).await.unwrap();
        assert_eq!(reply.command(), Some("getenergydata"));
    }
}
