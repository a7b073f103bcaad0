//! Decoding of remote property values into native types.
//!
//! Every property read goes through one of the explicit decode functions
//! here, selected by the wire type tag of the received value. A value of
//! the wrong type is an error, never a silent coercion.

use std::{collections::HashMap, time::Duration};

use zbus::zvariant::{OwnedValue, Value};

use crate::error::{PlayerError, Result};

/// Current playback state reported by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Player is currently playing
    Playing,

    /// Player is paused
    Paused,

    /// Player is stopped
    Stopped,
}

impl From<&str> for PlaybackState {
    fn from(status: &str) -> Self {
        match status {
            "Playing" => Self::Playing,
            "Paused" => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Metadata for the currently loaded source.
///
/// The player publishes a sparse MPRIS metadata dict; only the track
/// length and source URL are guaranteed to be present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    /// Track length, from `mpris:length` (microseconds on the wire)
    pub length: Option<Duration>,

    /// Source URL, from `xesam:url`
    pub url: Option<String>,
}

impl From<HashMap<String, OwnedValue>> for TrackMetadata {
    fn from(metadata: HashMap<String, OwnedValue>) -> Self {
        let mut track = Self::default();

        if let Some(length) = metadata.get("mpris:length") {
            if let Ok(micros) = decode_i64("mpris:length", length) {
                if micros > 0 {
                    track.length = Some(Duration::from_micros(micros as u64));
                }
            }
        }

        if let Some(url) = metadata.get("xesam:url") {
            if let Ok(url) = decode_string("xesam:url", url) {
                track.url = Some(url);
            }
        }

        track
    }
}

/// One entry of the player's audio/video/subtitle stream listing.
///
/// The player reports streams as `index:language:name:codec:active`
/// strings; this is the parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stream index, usable with the select operations
    pub index: i32,

    /// Language code, empty when the container carries none
    pub language: String,

    /// Stream name
    pub name: String,

    /// Codec name
    pub codec: String,

    /// Whether this stream is currently selected
    pub active: bool,
}

impl StreamInfo {
    /// Parse one `index:language:name:codec:active` listing entry.
    ///
    /// Returns `None` for entries that do not follow the format.
    pub fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.splitn(5, ':');
        let index = parts.next()?.parse().ok()?;
        let language = parts.next()?.to_string();
        let name = parts.next()?.to_string();
        let codec = parts.next()?.to_string();
        let active = parts.next()? == "active";

        Some(Self {
            index,
            language,
            name,
            codec,
            active,
        })
    }
}

/// Parse a full stream listing, dropping malformed entries.
pub fn parse_streams(entries: &[String]) -> Vec<StreamInfo> {
    entries
        .iter()
        .filter_map(|entry| StreamInfo::parse(entry))
        .collect()
}

/// Volume in millibels from the linear gain the player reports.
pub fn millibels_from_gain(gain: f64) -> f64 {
    2000.0 * gain.log10()
}

/// Linear gain for the player from a volume in millibels.
pub fn gain_from_millibels(millibels: f64) -> f64 {
    10f64.powf(millibels / 2000.0)
}

/// Seconds from a wire position/duration in microseconds.
pub fn secs_from_micros(micros: i64) -> f64 {
    micros as f64 / 1e6
}

/// Wire microseconds from a position/duration in seconds.
pub fn micros_from_secs(seconds: f64) -> i64 {
    (seconds * 1e6).round() as i64
}

/// Short label for a wire value's type tag, for error reporting.
fn type_label(value: &Value<'_>) -> &'static str {
    match value {
        Value::U8(_) => "byte",
        Value::Bool(_) => "boolean",
        Value::I16(_) => "int16",
        Value::U16(_) => "uint16",
        Value::I32(_) => "int32",
        Value::U32(_) => "uint32",
        Value::I64(_) => "int64",
        Value::U64(_) => "uint64",
        Value::F64(_) => "double",
        Value::Str(_) => "string",
        Value::Signature(_) => "signature",
        Value::ObjectPath(_) => "object path",
        Value::Value(_) => "variant",
        Value::Array(_) => "array",
        Value::Dict(_) => "dict",
        Value::Structure(_) => "struct",
        _ => "other",
    }
}

fn unexpected(property: &'static str, expected: &'static str, value: &Value<'_>) -> PlayerError {
    PlayerError::UnexpectedType {
        property,
        expected,
        got: type_label(value),
    }
}

/// Decode a boolean property value.
pub(crate) fn decode_bool(property: &'static str, value: &OwnedValue) -> Result<bool> {
    match &**value {
        Value::Bool(b) => Ok(*b),
        Value::Value(inner) => match &**inner {
            Value::Bool(b) => Ok(*b),
            other => Err(unexpected(property, "boolean", other)),
        },
        other => Err(unexpected(property, "boolean", other)),
    }
}

/// Decode an integer property value, widening from any integer tag.
pub(crate) fn decode_i64(property: &'static str, value: &OwnedValue) -> Result<i64> {
    decode_i64_value(property, value)
}

fn decode_i64_value(property: &'static str, value: &Value<'_>) -> Result<i64> {
    match value {
        Value::U8(n) => Ok(i64::from(*n)),
        Value::I16(n) => Ok(i64::from(*n)),
        Value::U16(n) => Ok(i64::from(*n)),
        Value::I32(n) => Ok(i64::from(*n)),
        Value::U32(n) => Ok(i64::from(*n)),
        Value::I64(n) => Ok(*n),
        Value::U64(n) => {
            i64::try_from(*n).map_err(|_| unexpected(property, "integer in i64 range", value))
        }
        Value::Value(inner) => decode_i64_value(property, inner),
        other => Err(unexpected(property, "integer", other)),
    }
}

/// Decode a floating-point property value, accepting integer tags too.
pub(crate) fn decode_f64(property: &'static str, value: &OwnedValue) -> Result<f64> {
    match &**value {
        Value::F64(f) => Ok(*f),
        Value::Value(inner) => match &**inner {
            Value::F64(f) => Ok(*f),
            other => decode_i64_value(property, other).map(|n| n as f64),
        },
        other => decode_i64_value(property, other).map(|n| n as f64),
    }
}

/// Decode a string property value.
pub(crate) fn decode_string(property: &'static str, value: &OwnedValue) -> Result<String> {
    match &**value {
        Value::Str(s) => Ok(s.to_string()),
        Value::Value(inner) => match &**inner {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(unexpected(property, "string", other)),
        },
        other => Err(unexpected(property, "string", other)),
    }
}

/// Decode a metadata dict into its key/value entries.
pub(crate) fn decode_dict(
    property: &'static str,
    value: &OwnedValue,
) -> Result<HashMap<String, OwnedValue>> {
    if !matches!(&**value, Value::Dict(_)) {
        return Err(unexpected(property, "dict", value));
    }
    HashMap::<String, OwnedValue>::try_from(value.clone())
        .map_err(|e| PlayerError::Dbus(zbus::Error::Variant(e)))
}
