// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON serialization of display snapshots.
//!
//! Encodes a [`Snapshot`] as the persisted reconnection payload:
//!
//! ```json
//! {
//!   "state": 1,
//!   "timestamp": 42,
//!   "layers": {
//!     "0": { "width": 1024, "height": 768 },
//!     "3": { "width": 64, "height": 64, "x": 10, "y": 20, "z": 2,
//!            "alpha": 128, "matrix": [1, 0, 0, 1, 0, 0],
//!            "resourceReference": 7, "parent": 0 }
//!   }
//! }
//! ```
//!
//! Optional fields are omitted entirely rather than written as `null`, and
//! [`decode`] treats absence as the default, so encode/decode round-trips
//! are exact. Layer ids are object keys (JSON object keys are strings).

use std::io::{self, Write};

use serde_json::{Map, Value, json};

use strata_core::resource::ResourceId;
use strata_core::snapshot::{LayerEntry, Snapshot};

/// Error returned by [`decode`].
#[derive(Debug)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    Parse(serde_json::Error),
    /// The JSON is structurally valid but not a snapshot; names the first
    /// offending field.
    Malformed(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid JSON: {err}"),
            Self::Malformed(field) => write!(f, "malformed snapshot field: {field}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Malformed(_) => None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

/// Encodes a snapshot as a JSON value.
#[must_use]
pub fn encode(snapshot: &Snapshot) -> Value {
    let mut layers = Map::new();
    for (id, entry) in &snapshot.layers {
        let mut object = Map::new();
        object.insert("width".into(), json!(entry.width));
        object.insert("height".into(), json!(entry.height));
        if let Some(ResourceId(resource)) = entry.resource {
            object.insert("resourceReference".into(), json!(resource));
        }
        if let Some(x) = entry.x {
            object.insert("x".into(), json!(x));
        }
        if let Some(y) = entry.y {
            object.insert("y".into(), json!(y));
        }
        if let Some(z) = entry.z {
            object.insert("z".into(), json!(z));
        }
        if let Some(alpha) = entry.alpha {
            object.insert("alpha".into(), json!(alpha));
        }
        if let Some(matrix) = entry.matrix {
            object.insert("matrix".into(), json!(matrix));
        }
        if let Some(parent) = entry.parent {
            object.insert("parent".into(), json!(parent));
        }
        layers.insert(id.to_string(), Value::Object(object));
    }
    json!({
        "state": snapshot.state,
        "timestamp": snapshot.timestamp,
        "layers": layers,
    })
}

/// Encodes a snapshot as a JSON string.
#[must_use]
pub fn to_string(snapshot: &Snapshot) -> String {
    encode(snapshot).to_string()
}

/// Writes a snapshot as JSON to the given writer.
pub fn write(snapshot: &Snapshot, writer: &mut dyn Write) -> io::Result<()> {
    serde_json::to_writer(writer, &encode(snapshot)).map_err(io::Error::other)
}

/// Parses a snapshot from JSON text.
pub fn decode(text: &str) -> Result<Snapshot, DecodeError> {
    decode_value(&serde_json::from_str(text)?)
}

/// Parses a snapshot from an already-parsed JSON value.
pub fn decode_value(value: &Value) -> Result<Snapshot, DecodeError> {
    let state = field_u64(value, "state")?;
    let state = u32::try_from(state).map_err(|_| DecodeError::Malformed("state"))?;
    let timestamp = field_u64(value, "timestamp")?;

    let mut snapshot = Snapshot {
        state,
        timestamp,
        ..Snapshot::default()
    };

    let layers = value
        .get("layers")
        .and_then(Value::as_object)
        .ok_or(DecodeError::Malformed("layers"))?;
    for (key, object) in layers {
        let id: i64 = key.parse().map_err(|_| DecodeError::Malformed("layer id"))?;
        snapshot.layers.insert(id, decode_entry(object)?);
    }
    Ok(snapshot)
}

fn decode_entry(object: &Value) -> Result<LayerEntry, DecodeError> {
    let width = field_i64(object, "width")?;
    let height = field_i64(object, "height")?;
    let mut entry = LayerEntry {
        width: int32(width, "width")?,
        height: int32(height, "height")?,
        ..LayerEntry::default()
    };

    if let Some(resource) = object.get("resourceReference") {
        let id = resource
            .as_u64()
            .ok_or(DecodeError::Malformed("resourceReference"))?;
        entry.resource = Some(ResourceId(id));
    }
    if let Some(x) = object.get("x") {
        entry.x = Some(int32(
            x.as_i64().ok_or(DecodeError::Malformed("x"))?,
            "x",
        )?);
    }
    if let Some(y) = object.get("y") {
        entry.y = Some(int32(
            y.as_i64().ok_or(DecodeError::Malformed("y"))?,
            "y",
        )?);
    }
    if let Some(z) = object.get("z") {
        entry.z = Some(int32(
            z.as_i64().ok_or(DecodeError::Malformed("z"))?,
            "z",
        )?);
    }
    if let Some(alpha) = object.get("alpha") {
        let alpha = alpha.as_u64().ok_or(DecodeError::Malformed("alpha"))?;
        entry.alpha = Some(u8::try_from(alpha).map_err(|_| DecodeError::Malformed("alpha"))?);
    }
    if let Some(matrix) = object.get("matrix") {
        let items = matrix.as_array().ok_or(DecodeError::Malformed("matrix"))?;
        if items.len() != 6 {
            return Err(DecodeError::Malformed("matrix"));
        }
        let mut coeffs = [0.0_f64; 6];
        for (slot, item) in coeffs.iter_mut().zip(items) {
            *slot = item.as_f64().ok_or(DecodeError::Malformed("matrix"))?;
        }
        entry.matrix = Some(coeffs);
    }
    if let Some(parent) = object.get("parent") {
        entry.parent = Some(parent.as_i64().ok_or(DecodeError::Malformed("parent"))?);
    }
    Ok(entry)
}

fn field_u64(value: &Value, name: &'static str) -> Result<u64, DecodeError> {
    value
        .get(name)
        .and_then(Value::as_u64)
        .ok_or(DecodeError::Malformed(name))
}

fn field_i64(value: &Value, name: &'static str) -> Result<i64, DecodeError> {
    value
        .get(name)
        .and_then(Value::as_i64)
        .ok_or(DecodeError::Malformed(name))
}

fn int32(value: i64, name: &'static str) -> Result<i32, DecodeError> {
    i32::try_from(value).map_err(|_| DecodeError::Malformed(name))
}
