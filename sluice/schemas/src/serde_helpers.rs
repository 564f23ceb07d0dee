//! Shared serde helper functions for deserialization and default values.
//!
//! Event timestamps travel as numeric strings (milliseconds since the epoch) but
//! are held as `i64` in memory.

use serde::{Deserialize, Deserializer, Serializer};

// =============================================================================
// Default value functions
// =============================================================================

/// Default value for boolean fields that should be true
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Custom (de)serializers
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Int(i64),
    Float(f64),
}

/// Deserialize a millisecond timestamp given either as a numeric string or as a number
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Int(value) => Ok(value),
        RawTimestamp::Float(value) => Ok(value as i64),
        RawTimestamp::Text(text) => parse_timestamp(&text)
            .ok_or_else(|| D::Error::custom(format!("Invalid timestamp: {text}"))),
    }
}

/// Serialize a millisecond timestamp as a numeric string, mirroring the wire format
pub fn serialize_timestamp<S>(timestamp: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&timestamp.to_string())
}

// fractional timestamps ("1690000000000.25") are truncated to whole milliseconds
fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
}
