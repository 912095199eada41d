// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Field extraction from flattened payload maps.

use std::str::FromStr;

use crate::error::ParseError;
use crate::protocol::DataMap;

/// Returns a field that must be present and non-empty.
pub(crate) fn required<'a>(map: &'a DataMap, field: &str) -> Result<&'a str, ParseError> {
    map.get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ParseError::MissingField(field.to_string()))
}

/// Returns a field if present and non-empty.
pub(crate) fn optional<'a>(map: &'a DataMap, field: &str) -> Option<&'a str> {
    map.get(field).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Parses a field if present.
pub(crate) fn parse<T: FromStr>(map: &DataMap, field: &str) -> Result<Option<T>, ParseError> {
    optional(map, field)
        .map(|raw| {
            raw.parse()
                .map_err(|_| ParseError::invalid(field, format!("unexpected value {raw:?}")))
        })
        .transpose()
}

/// Parses a field that must be present.
pub(crate) fn parse_required<T: FromStr>(map: &DataMap, field: &str) -> Result<T, ParseError> {
    parse(map, field)?.ok_or_else(|| ParseError::MissingField(field.to_string()))
}
