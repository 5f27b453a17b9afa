//! Lenient deserializers for loosely-typed wire values.
//!
//! Peers and intermediate proxies have been observed to serialize numeric
//! fields as strings and timestamps as epoch milliseconds. These helpers
//! coerce such values into the entity's declared types instead of failing
//! the whole apply step.

use crate::types::Timestamp;
use serde::de::{self, Deserializer, Visitor};
use std::fmt;

struct NumberVisitor;

impl Visitor<'_> for NumberVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a numeric string")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        v.trim().parse().map_err(de::Error::custom)
    }
}

/// Deserializes an `f64` from a JSON number or a numeric string.
pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    deserializer.deserialize_any(NumberVisitor)
}

/// Deserializes a `u32` from a JSON number or a numeric string.
pub fn uint<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let v = deserializer.deserialize_any(NumberVisitor)?;
    if v.fract() != 0.0 || v < 0.0 || v > f64::from(u32::MAX) {
        return Err(de::Error::custom(format!("not an unsigned integer: {v}")));
    }
    Ok(v as u32)
}

/// Deserializes an `i32` from a JSON number or a numeric string.
pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let v = deserializer.deserialize_any(NumberVisitor)?;
    if v.fract() != 0.0 || v < f64::from(i32::MIN) || v > f64::from(i32::MAX) {
        return Err(de::Error::custom(format!("not an integer: {v}")));
    }
    Ok(v as i32)
}

struct TimestampVisitor;

impl Visitor<'_> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an RFC 3339 string or epoch milliseconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
        chrono::DateTime::parse_from_rfc3339(v)
            .map(|t| t.with_timezone(&chrono::Utc))
            .map_err(de::Error::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
        chrono::DateTime::from_timestamp_millis(v)
            .ok_or_else(|| de::Error::custom(format!("epoch millis out of range: {v}")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
        let v = i64::try_from(v).map_err(de::Error::custom)?;
        self.visit_i64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
        self.visit_i64(v as i64)
    }
}

/// Deserializes a [`Timestamp`] from RFC 3339 or epoch milliseconds.
pub fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
    deserializer.deserialize_any(TimestampVisitor)
}

struct OptTimestampVisitor;

impl<'de> Visitor<'de> for OptTimestampVisitor {
    type Value = Option<Timestamp>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an optional RFC 3339 string or epoch milliseconds")
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        timestamp(deserializer).map(Some)
    }
}

/// Deserializes an `Option<Timestamp>`, treating `null` as `None`.
pub fn timestamp_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Timestamp>, D::Error> {
    deserializer.deserialize_option(OptTimestampVisitor)
}
