// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Energy meters and accumulation of their reading series.
//!
//! `getenergydata` answers with one delta per 10-minute bucket, the last one
//! ending at the requested end time. A [`MeterReading`] turns those series
//! into a running total and a total since local midnight:
//!
//! - the first read sums the whole series from the meter's reference date;
//! - later reads start one bucket before the previous end, so their first
//!   value repeats the previous last bucket and is skipped.
//!
//! Day boundaries are taken in the controller's time zone.
//!
//! # Examples
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use nhc_lib::state::MeterReading;
//! use nhc_lib::types::ControllerTimeZone;
//!
//! let tz = ControllerTimeZone::default();
//! let series = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
//!
//! let end = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
//! let first = MeterReading::initial(end, &series(&["10", "10", "10"]), &tz).unwrap();
//! assert_eq!(first.total, 30.0);
//!
//! let later = Utc.with_ymd_and_hms(2024, 3, 5, 12, 10, 0).unwrap();
//! let next = first.advance(later, &series(&["10", "5"]), &tz).unwrap();
//! assert_eq!(next.total, 35.0);
//! assert_eq!(next.day, 35.0);
//! ```

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::fields;
use super::location::Locations;
use crate::command::BUCKET_MINUTES;
use crate::error::ParseError;
use crate::protocol::DataMap;
use crate::types::{ControllerTimeZone, MeterType};

/// Accumulated figures of a meter after a read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    /// End of the last bucket included.
    pub end: DateTime<Utc>,
    /// Sum of every bucket since the reference date.
    pub total: f64,
    /// Sum of the buckets since local midnight of `end`.
    pub day: f64,
}

impl MeterReading {
    /// Builds the first reading from a full series.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidValue` if a value is not a number.
    pub fn initial(
        end: DateTime<Utc>,
        series: &[String],
        tz: &ControllerTimeZone,
    ) -> Result<Self, ParseError> {
        let values = parse_series(series)?;
        let midnight = tz.start_of_day(end);

        Ok(Self {
            end,
            total: values.iter().sum(),
            day: sum_after(&values, 0, end, midnight),
        })
    }

    /// Builds the next reading from a series whose first value repeats the
    /// last bucket of `self`.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidValue` if a value is not a number.
    pub fn advance(
        &self,
        end: DateTime<Utc>,
        series: &[String],
        tz: &ControllerTimeZone,
    ) -> Result<Self, ParseError> {
        let values = parse_series(series)?;
        let fresh: f64 = values.iter().skip(1).sum();

        let day = if tz.local_date(end) == tz.local_date(self.end) {
            self.day + fresh
        } else {
            sum_after(&values, 1, end, tz.start_of_day(end))
        };

        Ok(Self {
            end,
            total: self.total + fresh,
            day,
        })
    }
}

fn parse_series(series: &[String]) -> Result<Vec<f64>, ParseError> {
    series
        .iter()
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParseError::invalid("getenergydata", format!("not a number: {raw:?}")))
        })
        .collect()
}

/// Sums the values from `skip` on whose bucket ends after `midnight`.
fn sum_after(values: &[f64], skip: usize, end: DateTime<Utc>, midnight: DateTime<Utc>) -> f64 {
    let last = values.len().saturating_sub(1);
    values
        .iter()
        .enumerate()
        .skip(skip)
        .filter(|(index, _)| {
            let buckets_before_end = i64::try_from(last - index).unwrap_or(i64::MAX / BUCKET_MINUTES);
            end - Duration::minutes(buckets_before_end * BUCKET_MINUTES) > midnight
        })
        .map(|(_, value)| value)
        .sum()
}

/// An energy, gas or water meter channel.
#[derive(Debug)]
pub struct Meter {
    id: String,
    channel: u32,
    kind: MeterType,
    data: RwLock<MeterData>,
}

#[derive(Debug, Clone, Default)]
struct MeterData {
    name: String,
    location: String,
    reference: Option<DateTime<Utc>>,
    /// Reference date from the last `listenergy`; a local override survives
    /// until the controller reports a different one.
    reported_reference: Option<DateTime<Utc>>,
    reading: Option<MeterReading>,
    live: Option<f64>,
}

impl Meter {
    /// Creates a meter from a bootstrap `listenergy` item.
    pub(crate) fn from_map(
        map: &DataMap,
        locations: &Locations,
        tz: &ControllerTimeZone,
    ) -> Result<Self, ParseError> {
        let id = fields::required(map, "channel")?.to_string();
        let channel = id
            .parse()
            .map_err(|_| ParseError::invalid("channel", format!("not an integer: {id:?}")))?;
        let reference = match fields::optional(map, "reference") {
            Some(raw) => Some(
                tz.parse_stamp(raw)
                    .ok_or_else(|| ParseError::invalid("reference", format!("not a timestamp: {raw:?}")))?,
            ),
            None => None,
        };

        Ok(Self {
            id,
            channel,
            kind: MeterType::from_code(fields::optional(map, "type").unwrap_or_default()),
            data: RwLock::new(MeterData {
                name: fields::optional(map, "name").unwrap_or_default().to_string(),
                location: fields::optional(map, "location")
                    .map(|id| locations.resolve(id))
                    .unwrap_or_default(),
                reference,
                reported_reference: reference,
                ..MeterData::default()
            }),
        })
    }

    /// Returns the meter id, which is its channel number.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the channel number.
    #[must_use]
    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Returns the meter type.
    #[must_use]
    pub fn kind(&self) -> MeterType {
        self.kind
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.data.read().name.clone()
    }

    /// Returns the location name.
    #[must_use]
    pub fn location(&self) -> String {
        self.data.read().location.clone()
    }

    /// Returns the instant accumulation starts from.
    #[must_use]
    pub fn reference_date(&self) -> Option<DateTime<Utc>> {
        self.data.read().reference
    }

    /// Returns the latest accumulated reading.
    #[must_use]
    pub fn reading(&self) -> Option<MeterReading> {
        self.data.read().reading
    }

    /// Returns the cumulative total since the reference date.
    #[must_use]
    pub fn total(&self) -> Option<f64> {
        self.reading().map(|r| r.total)
    }

    /// Returns the total since local midnight.
    #[must_use]
    pub fn day_total(&self) -> Option<f64> {
        self.reading().map(|r| r.day)
    }

    /// Returns the last live value pushed by the controller.
    #[must_use]
    pub fn live_value(&self) -> Option<f64> {
        self.data.read().live
    }

    /// Sets the reference date and restarts accumulation from it.
    pub(crate) fn set_reference_date(&self, reference: DateTime<Utc>) {
        let mut data = self.data.write();
        if data.reference != Some(reference) {
            data.reference = Some(reference);
            data.reading = None;
        }
    }

    /// Takes name, location and reported reference date from a fresh
    /// `listenergy` item. Returns `true` if anything changed.
    pub(crate) fn apply(&self, fresh: &Meter) -> bool {
        let fresh = fresh.data.read().clone();
        let mut data = self.data.write();
        let mut changed = false;

        if data.name != fresh.name {
            data.name = fresh.name;
            changed = true;
        }
        if data.location != fresh.location {
            data.location = fresh.location;
            changed = true;
        }
        if data.reported_reference != fresh.reported_reference {
            data.reported_reference = fresh.reported_reference;
            if data.reference != fresh.reported_reference {
                data.reference = fresh.reported_reference;
                data.reading = None;
            }
            changed = true;
        }
        changed
    }

    /// Applies a series read for the window ending at `end`.
    ///
    /// An initial read, or any read without a previous reading, replaces the
    /// totals. Returns the new reading.
    pub(crate) fn record_series(
        &self,
        end: DateTime<Utc>,
        series: &[String],
        initial: bool,
        tz: &ControllerTimeZone,
    ) -> Result<MeterReading, ParseError> {
        let mut data = self.data.write();
        let reading = match data.reading.filter(|_| !initial) {
            Some(previous) => previous.advance(end, series, tz)?,
            None => MeterReading::initial(end, series, tz)?,
        };
        data.reading = Some(reading);
        Ok(reading)
    }

    /// Records a live value. Returns `true` if it changed.
    pub(crate) fn set_live(&self, value: f64) -> bool {
        let mut data = self.data.write();
        if data.live == Some(value) {
            return false;
        }
        data.live = Some(value);
        true
    }
}
