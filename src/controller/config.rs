// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller connection settings.

use std::time::Duration;

use chrono_tz::Tz;

/// TCP port the controller listens on.
pub const DEFAULT_PORT: u16 = 8000;

/// Longest wait for the reply to the previous command before sending anyway.
pub const DEFAULT_CORRELATION_TIMEOUT: Duration = Duration::from_millis(2000);

/// Socket timeout for connecting, writing and bootstrap reads.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Settings for one controller.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use nhc_lib::controller::{ControllerConfig, ReconnectionPolicy};
///
/// let config = ControllerConfig::new("192.168.1.20")
///     .with_port(8000)
///     .with_timezone(chrono_tz::Europe::Brussels)
///     .with_reconnection(ReconnectionPolicy::new().with_max_retries(5));
///
/// assert_eq!(config.host, "192.168.1.20");
/// assert_eq!(config.correlation_timeout, Duration::from_millis(2000));
/// ```
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller host name or IP address.
    pub host: String,
    /// Controller TCP port.
    pub port: u16,
    /// How long a correlated send waits for the previous reply.
    pub correlation_timeout: Duration,
    /// Socket I/O timeout.
    pub io_timeout: Duration,
    /// Installation time zone.
    ///
    /// Overrides the fixed offset the controller reports, so that meter day
    /// totals follow daylight saving changes.
    pub timezone: Option<Tz>,
    /// Reconnection after a lost connection.
    pub reconnection: ReconnectionPolicy,
}

impl ControllerConfig {
    /// Creates a configuration with default settings for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            correlation_timeout: DEFAULT_CORRELATION_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            timezone: None,
            reconnection: ReconnectionPolicy::default(),
        }
    }

    /// Sets the TCP port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the correlation timeout.
    #[must_use]
    pub fn with_correlation_timeout(mut self, timeout: Duration) -> Self {
        self.correlation_timeout = timeout;
        self
    }

    /// Sets the socket I/O timeout.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the installation time zone.
    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }
}

/// Pacing of reconnect attempts after the controller connection is lost.
///
/// Delays grow by `backoff_multiplier` per attempt, capped at `max_delay`.
///
/// ```
/// use std::time::Duration;
/// use nhc_lib::controller::ReconnectionPolicy;
///
/// let policy = ReconnectionPolicy::new()
///     .with_initial_delay(Duration::from_secs(2))
///     .with_max_delay(Duration::from_secs(30));
///
/// assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
/// assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    /// Whether a lost connection is reopened automatically.
    pub enabled: bool,
    /// Attempts before giving up, `None` to keep trying.
    pub max_retries: Option<u32>,
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound of the delay.
    pub max_delay: Duration,
    /// Growth factor of the delay per attempt.
    pub backoff_multiplier: f32,
}

impl ReconnectionPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Limits the number of attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Removes the attempt limit.
    #[must_use]
    pub fn with_infinite_retries(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Sets the delay before the first attempt.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the upper bound of the delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor of the delay.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns the delay before attempt number `attempt`, counting from 0.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        // Safe: delays are seconds to minutes
        #[allow(clippy::cast_precision_loss)]
        let millis = self.initial_delay.as_millis() as f32 * factor;

        // Safe: millis is positive; overflowing values saturate and are capped below
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(millis as u64);

        delay.min(self.max_delay)
    }

    /// Returns `true` if attempt number `attempt` may be made.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && self.max_retries.is_none_or(|max| attempt < max)
    }
}

impl Default for ReconnectionPolicy {
    /// Keeps trying, every 5 seconds at first and at most every 5 minutes.
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: None,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}
