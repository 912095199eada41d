// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Meter read windows.

use chrono::{DateTime, Duration, Utc};

use crate::types::timestamp::floor_to_minutes;

/// Width of one bucket in a `getenergydata` series.
pub(crate) const BUCKET_MINUTES: i64 = 10;

/// Time window of a `getenergydata` request.
///
/// Both ends sit on 10-minute bucket boundaries. The controller answers with
/// one value per bucket, the last one ending at [`end`](Self::end).
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use nhc_lib::command::EnergyWindow;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
/// let now = Utc.with_ymd_and_hms(2024, 1, 1, 11, 7, 0).unwrap();
/// let window = EnergyWindow::until(start, now);
///
/// assert_eq!(window.end(), Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap());
/// assert_eq!(window.bucket_count(), 6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl EnergyWindow {
    /// Creates a window from `start` up to the last bucket boundary before `now`.
    ///
    /// The end never precedes the start.
    #[must_use]
    pub fn until(start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let start = floor_to_minutes(start, BUCKET_MINUTES);
        let end = floor_to_minutes(now, BUCKET_MINUTES).max(start);
        Self { start, end }
    }

    /// Returns the window start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the window end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns the number of whole buckets in the window.
    #[must_use]
    pub fn bucket_count(&self) -> i64 {
        (self.end - self.start).num_minutes() / BUCKET_MINUTES
    }

    /// Returns `true` if the window holds no complete bucket.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end - self.start < Duration::minutes(BUCKET_MINUTES)
    }
}
