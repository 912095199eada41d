// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line codec for the controller's JSON protocol.
//!
//! Every line on the socket is one JSON object. Replies to requests carry a
//! `cmd` field naming the request, unsolicited pushes carry an `event` field
//! instead. The `data` value comes in three shapes and the shape alone
//! decides how it is decoded:
//!
//! | `data` value | [`Payload`] |
//! |---|---|
//! | absent, `null` or object | [`Payload::Map`] |
//! | array of objects (or empty array) | [`Payload::List`] |
//! | array of scalars | [`Payload::Series`] |
//!
//! Anything else is a [`ParseError`]. Scalar values are flattened to
//! strings since the controller itself is inconsistent about quoting numbers.
//!
//! # Examples
//!
//! ```
//! use nhc_lib::protocol::{Payload, decode};
//!
//! let msg = decode(r#"{"cmd":"executeactions","data":{"error":0}}"#).unwrap();
//! assert_eq!(msg.command(), Some("executeactions"));
//! assert_eq!(msg.error_code(), Some(0));
//!
//! let msg = decode(r#"{"event":"listactions","data":[{"id":"7","value1":"40"}]}"#).unwrap();
//! assert_eq!(msg.event(), Some("listactions"));
//! assert!(matches!(msg.payload(), Payload::List(items) if items[0]["value1"] == "40"));
//!
//! // A bare string is not a valid data shape
//! assert!(decode(r#"{"cmd":"systeminfo","data":"oops"}"#).is_err());
//! ```

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Flat string map, the unit of every payload shape.
pub type DataMap = HashMap<String, String>;

/// What a decoded message answers or announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// Reply to a request, named after the request (`cmd`).
    Command(String),
    /// Unsolicited push from the controller (`event`).
    Event(String),
}

/// Decoded `data` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Single object.
    Map(DataMap),
    /// Array of objects.
    List(Vec<DataMap>),
    /// Array of scalars.
    Series(Vec<String>),
}

impl Payload {
    /// Returns a short name of the shape for diagnostics.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Map(_) => "map",
            Self::List(_) => "list",
            Self::Series(_) => "series",
        }
    }
}

/// One decoded protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    tag: Tag,
    payload: Payload,
}

impl Message {
    /// Creates a message from its parts.
    #[must_use]
    pub fn new(tag: Tag, payload: Payload) -> Self {
        Self { tag, payload }
    }

    /// Returns the tag.
    #[must_use]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consumes the message and returns its payload.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Returns the `cmd` name if this is a command reply.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match &self.tag {
            Tag::Command(name) => Some(name),
            Tag::Event(_) => None,
        }
    }

    /// Returns the `event` name if this is an unsolicited push.
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        match &self.tag {
            Tag::Event(name) => Some(name),
            Tag::Command(_) => None,
        }
    }

    /// Returns `true` for command replies.
    #[must_use]
    pub fn is_command(&self) -> bool {
        matches!(self.tag, Tag::Command(_))
    }

    /// Returns the inline `error` code of a map payload.
    ///
    /// Returns `None` when there is no code or it is not an integer.
    #[must_use]
    pub fn error_code(&self) -> Option<i64> {
        match &self.payload {
            Payload::Map(map) => map.get("error").and_then(|v| v.trim().parse().ok()),
            Payload::List(_) | Payload::Series(_) => None,
        }
    }
}

/// Decodes one protocol line.
///
/// # Errors
///
/// Returns `ParseError::Json` for malformed JSON and
/// `ParseError::UnexpectedShape` when the envelope has neither a `cmd` nor an
/// `event`, or when `data` has an unsupported shape.
pub fn decode(line: &str) -> Result<Message, ParseError> {
    let value: Value = serde_json::from_str(line.trim())?;
    let Value::Object(mut envelope) = value else {
        return Err(ParseError::UnexpectedShape(
            "envelope is not an object".to_string(),
        ));
    };

    let tag = match (tag_name(&envelope, "cmd"), tag_name(&envelope, "event")) {
        (Some(cmd), _) => Tag::Command(cmd),
        (None, Some(event)) => Tag::Event(event),
        (None, None) => {
            return Err(ParseError::UnexpectedShape(
                "envelope has neither cmd nor event".to_string(),
            ));
        }
    };

    let payload = decode_payload(envelope.remove("data").unwrap_or(Value::Null))?;

    Ok(Message { tag, payload })
}

/// Encodes an outbound request as one protocol line, newline included.
///
/// # Errors
///
/// Returns `ParseError::Json` if the request cannot be serialized, and
/// `ParseError::UnexpectedShape` if it does not serialize to an object.
pub fn encode<T: Serialize + ?Sized>(request: &T) -> Result<String, ParseError> {
    let value = serde_json::to_value(request)?;
    if !value.is_object() {
        return Err(ParseError::UnexpectedShape(
            "outbound message is not an object".to_string(),
        ));
    }
    let mut line = value.to_string();
    line.push('\n');
    Ok(line)
}

fn tag_name(envelope: &Map<String, Value>, key: &str) -> Option<String> {
    envelope
        .get(key)
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn decode_payload(data: Value) -> Result<Payload, ParseError> {
    match data {
        Value::Null => Ok(Payload::Map(DataMap::new())),
        Value::Object(obj) => Ok(Payload::Map(flatten_object(obj))),
        Value::Array(items) => {
            if items.iter().all(Value::is_object) {
                let list = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(obj) => Some(flatten_object(obj)),
                        _ => None,
                    })
                    .collect();
                Ok(Payload::List(list))
            } else if items.iter().all(is_scalar) {
                Ok(Payload::Series(items.into_iter().map(scalar_to_string).collect()))
            } else {
                Err(ParseError::UnexpectedShape(
                    "data array mixes objects and scalars".to_string(),
                ))
            }
        }
        other => Err(ParseError::UnexpectedShape(format!(
            "data is a bare scalar: {other}"
        ))),
    }
}

fn flatten_object(obj: Map<String, Value>) -> DataMap {
    obj.into_iter()
        .map(|(key, value)| (key, scalar_to_string(value)))
        .collect()
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_with_map_data() {
        let msg = decode(r#"{"cmd":"systeminfo","data":{"swversion":"1.10","api":2}}"#).unwrap();
        assert_eq!(msg.command(), Some("systeminfo"));
        assert!(msg.is_command());
        let Payload::Map(map) = msg.payload() else {
            panic!("expected map payload");
        };
        assert_eq!(map["swversion"], "1.10");
        assert_eq!(map["api"], "2");
    }

    #[test]
    fn missing_or_null_data_is_empty_map() {
        let msg = decode(r#"{"cmd":"startevents"}"#).unwrap();
        assert_eq!(msg.payload(), &Payload::Map(DataMap::new()));

        let msg = decode(r#"{"cmd":"startevents","data":null}"#).unwrap();
        assert_eq!(msg.payload(), &Payload::Map(DataMap::new()));
    }

    #[test]
    fn list_of_maps() {
        let msg =
            decode(r#"{"cmd":"listlocations","data":[{"id":1,"name":"Hall"},{"id":2,"name":"Attic"}]}"#)
                .unwrap();
        let Payload::List(items) = msg.payload() else {
            panic!("expected list payload");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["name"], "Attic");
        assert_eq!(items[0]["id"], "1");
    }

    #[test]
    fn series_of_scalars() {
        let msg = decode(r#"{"cmd":"getenergydata","data":["10",5,0.5,null]}"#).unwrap();
        assert_eq!(
            msg.payload(),
            &Payload::Series(vec![
                "10".to_string(),
                "5".to_string(),
                "0.5".to_string(),
                String::new()
            ])
        );
    }

    #[test]
    fn empty_array_is_empty_list() {
        let msg = decode(r#"{"cmd":"listactions","data":[]}"#).unwrap();
        assert_eq!(msg.payload(), &Payload::List(Vec::new()));
    }

    #[test]
    fn event_tag() {
        let msg = decode(r#"{"event":"getalarms","data":{"type":"0","text":"Fire"}}"#).unwrap();
        assert_eq!(msg.event(), Some("getalarms"));
        assert_eq!(msg.command(), None);
        assert!(!msg.is_command());
    }

    #[test]
    fn empty_cmd_falls_back_to_event() {
        let msg = decode(r#"{"cmd":"","event":"listactions","data":[]}"#).unwrap();
        assert_eq!(msg.event(), Some("listactions"));
    }

    #[test]
    fn bare_string_data_is_rejected() {
        let err = decode(r#"{"cmd":"systeminfo","data":"hello"}"#).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedShape(_)));
    }

    #[test]
    fn mixed_array_is_rejected() {
        let err = decode(r#"{"cmd":"listactions","data":[{"id":1},2]}"#).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedShape(_)));
    }

    #[test]
    fn nested_arrays_are_rejected() {
        assert!(decode(r#"{"cmd":"getenergydata","data":[[1,2],[3]]}"#).is_err());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            decode(r#"{"cmd":"systeminfo""#).unwrap_err(),
            ParseError::Json(_)
        ));
        assert!(decode("").is_err());
    }

    #[test]
    fn untagged_envelope_is_rejected() {
        assert!(decode(r#"{"data":{}}"#).is_err());
        assert!(decode(r"[1,2,3]").is_err());
    }

    #[test]
    fn error_code_from_map() {
        let msg = decode(r#"{"cmd":"executeactions","data":{"error":"3"}}"#).unwrap();
        assert_eq!(msg.error_code(), Some(3));

        let msg = decode(r#"{"cmd":"listactions","data":[]}"#).unwrap();
        assert_eq!(msg.error_code(), None);
    }

    #[test]
    fn encode_appends_newline() {
        #[derive(Serialize)]
        struct Probe {
            cmd: &'static str,
        }
        let line = encode(&Probe { cmd: "listactions" }).unwrap();
        assert_eq!(line, "{\"cmd\":\"listactions\"}\n");
    }

    #[test]
    fn encode_rejects_non_objects() {
        assert!(encode(&[1, 2, 3]).is_err());
    }
}
