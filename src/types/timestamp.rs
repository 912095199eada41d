// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller timestamps and time zone handling.
//!
//! The controller exchanges timestamps as `yyyyMMddHHmm` strings in its own
//! local time. Day boundaries for meter accumulation are also taken in that
//! local time, so every conversion goes through a [`ControllerTimeZone`].
//!
//! # Examples
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use nhc_lib::types::ControllerTimeZone;
//!
//! let tz = ControllerTimeZone::from_offset_secs(3600);
//! let instant = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
//!
//! // 23:30 UTC is already the next day at UTC+1
//! assert_eq!(tz.format_stamp(instant), "202401160030");
//! assert_eq!(tz.parse_stamp("202401160030"), Some(instant));
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Timestamp layout used in `getenergydata` requests and meter references.
pub const CONTROLLER_STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Time zone used to interpret controller timestamps.
///
/// The controller reports a fixed offset in `systeminfo`. An application
/// that knows the installation's IANA zone can configure it instead so that
/// daylight saving transitions are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerTimeZone {
    /// Fixed offset, as reported by the controller.
    Fixed(FixedOffset),
    /// Named IANA zone.
    Named(Tz),
}

impl Default for ControllerTimeZone {
    fn default() -> Self {
        Self::Fixed(utc_offset())
    }
}

impl From<Tz> for ControllerTimeZone {
    fn from(tz: Tz) -> Self {
        Self::Named(tz)
    }
}

impl ControllerTimeZone {
    /// Creates a fixed zone from an offset in seconds east of UTC.
    ///
    /// Offsets chrono cannot represent fall back to UTC.
    #[must_use]
    pub fn from_offset_secs(secs: i32) -> Self {
        Self::Fixed(FixedOffset::east_opt(secs).unwrap_or_else(utc_offset))
    }

    /// Returns the local calendar date of an instant.
    #[must_use]
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Fixed(offset) => instant.with_timezone(offset).date_naive(),
            Self::Named(tz) => instant.with_timezone(tz).date_naive(),
        }
    }

    /// Returns the instant of the local midnight that starts the day of `instant`.
    #[must_use]
    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(instant);
        match self {
            Self::Fixed(offset) => midnight(offset, date),
            Self::Named(tz) => midnight(tz, date),
        }
        .unwrap_or(instant)
    }

    /// Formats an instant as a controller `yyyyMMddHHmm` stamp.
    #[must_use]
    pub fn format_stamp(&self, instant: DateTime<Utc>) -> String {
        match self {
            Self::Fixed(offset) => instant
                .with_timezone(offset)
                .format(CONTROLLER_STAMP_FORMAT)
                .to_string(),
            Self::Named(tz) => instant
                .with_timezone(tz)
                .format(CONTROLLER_STAMP_FORMAT)
                .to_string(),
        }
    }

    /// Parses a controller `yyyyMMddHHmm` stamp.
    ///
    /// Returns `None` for malformed stamps and for local times that do not
    /// exist in this zone.
    #[must_use]
    pub fn parse_stamp(&self, stamp: &str) -> Option<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(stamp.trim(), CONTROLLER_STAMP_FORMAT).ok()?;
        match self {
            Self::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Truncates an instant down to a whole number of `minutes`.
pub(crate) fn floor_to_minutes(instant: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    let step = minutes.max(1) * 60;
    let secs = instant.timestamp();
    let floored = secs - secs.rem_euclid(step);
    DateTime::from_timestamp(floored, 0).unwrap_or(instant)
}

fn midnight<T: TimeZone>(tz: &T, date: NaiveDate) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    // A DST jump can skip local midnight; the day then starts an hour later.
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}
