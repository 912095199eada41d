// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection state reported by the controller client.

use std::fmt;

/// Connection state of a [`Controller`](super::Controller).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Communication is not started.
    #[default]
    Disconnected,
    /// Connecting and running the bootstrap sequence.
    Connecting,
    /// Bootstrapped and receiving events.
    Connected,
    /// The connection failed and no more attempts are scheduled.
    Failed(String),
    /// Waiting for a reconnection attempt after a connection loss.
    Reconnecting {
        /// Number of the upcoming attempt, starting at 1.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Returns true if the controller is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true if the controller is in a failed state.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Why the controller went offline.
///
/// [`key`](Self::key) gives a stable, translatable identifier; the detail
/// text is meant for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineReason {
    /// The socket failed or the controller stopped answering.
    CommunicationError(String),
    /// A command could not be sent, even after reconnecting.
    SendFailed(String),
    /// No host is configured.
    ConfigurationError(String),
}

impl OfflineReason {
    /// Returns the translatable key of this reason.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::CommunicationError(_) => "offline.communication-error",
            Self::SendFailed(_) => "offline.send-failed",
            Self::ConfigurationError(_) => "offline.configuration-error",
        }
    }

    /// Returns the detail text.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::CommunicationError(detail)
            | Self::SendFailed(detail)
            | Self::ConfigurationError(detail) => detail,
        }
    }
}

impl fmt::Display for OfflineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key(), self.detail())
    }
}
