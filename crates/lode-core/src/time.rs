//! Instant handling at the storage boundary
//!
//! Persisted documents have historically carried instants in several shapes:
//! epoch seconds, epoch milliseconds, and RFC 3339 strings. All of them are
//! normalized into a single `DateTime<Utc>` once, at deserialization; the
//! rest of the codebase never sees a raw encoding. Writes always use epoch
//! milliseconds.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Epoch values at or above this magnitude are treated as milliseconds.
/// (10^11 seconds is the year 5138; 10^11 milliseconds is March 1973.)
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    let millis = if raw.abs() >= MILLIS_THRESHOLD {
        raw
    } else {
        raw.checked_mul(1000)?
    };
    Utc.timestamp_millis_opt(millis).single()
}

/// Parse any of the historical instant encodings
pub fn parse_instant(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                from_epoch(i)
            } else {
                n.as_f64().and_then(|f| from_epoch(f as i64))
            }
        }
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// Serde adapter for required instant fields
pub mod instant {
    use super::*;

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_i64(dt.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = serde_json::Value::deserialize(de)?;
        parse_instant(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized instant: {raw}")))
    }
}

/// Serde adapter for optional instant fields
pub mod instant_opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => ser.serialize_some(&dt.timestamp_millis()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(de)?;
        match raw {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => parse_instant(&v)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("unrecognized instant: {v}"))),
        }
    }
}
