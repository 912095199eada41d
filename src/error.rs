// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `nhc_lib` library.
//!
//! Errors are split along the same lines the controller protocol fails:
//! transport problems on the socket, envelopes that cannot be decoded,
//! values rejected before they are sent, and lookups of unknown entities.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred while talking to the controller.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while decoding a controller message.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Communication with the controller is not active.
    #[error("controller is not connected")]
    NotConnected,

    /// No action with this id is known.
    #[error("action {0} not found")]
    ActionNotFound(String),

    /// No thermostat with this id is known.
    #[error("thermostat {0} not found")]
    ThermostatNotFound(String),

    /// No energy meter with this id is known.
    #[error("meter {0} not found")]
    MeterNotFound(String),
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
        /// The actual value that was provided.
        actual: i64,
    },

    /// The protocol addresses entities by integer id, this one is not.
    #[error("invalid entity id: {0}")]
    InvalidId(String),
}

/// Errors related to the socket connection with the controller.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection to the controller failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,

    /// The controller acknowledged a command with a non-zero error code.
    #[error("controller rejected command with error code {0}")]
    Rejected(i64),
}

/// Errors related to decoding controller messages.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope or its `data` value does not have a supported shape.
    #[error("unexpected message shape: {0}")]
    UnexpectedShape(String),

    /// Expected field is missing from the message.
    #[error("missing field in message: {0}")]
    MissingField(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

impl ParseError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
