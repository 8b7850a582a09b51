//! Pure normalization of raw detail records
//!
//! [`normalize`] is total: any [`AnimalDetail`] the wire schema accepts maps
//! to an [`Animal`] without error. Malformed optional fields degrade to an
//! empty list / an omitted timestamp rather than failing the record.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::{Animal, AnimalDetail};

/// Delimiter used by the source for the `friends` field.
const FRIENDS_DELIMITER: char = ',';

/// Normalize one raw detail record.
pub fn normalize(detail: AnimalDetail) -> Animal {
    let born_at = detail.born_at.and_then(normalize_born_at);
    Animal {
        id: detail.id,
        name: detail.name,
        friends: normalize_friends(detail.friends),
        born_at,
        extra: detail.extra,
    }
}

/// Split a delimited `friends` value into an ordered list of trimmed,
/// non-empty names. Already-split arrays pass through; anything else maps to
/// an empty list.
fn normalize_friends(raw: Option<Value>) -> Vec<String> {
    match raw {
        Some(Value::String(joined)) => joined
            .split(FRIENDS_DELIMITER)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Re-emit a `born_at` value as RFC 3339 UTC with seconds precision.
///
/// Numbers are epoch milliseconds (the source generates millis); strings are
/// accepted when already RFC 3339 and re-normalized to UTC. Anything
/// unparseable maps to `None` so the field is omitted downstream.
fn normalize_born_at(raw: Value) -> Option<String> {
    match raw {
        Value::Number(millis) => millis
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        Value::String(text) => DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true)),
        _ => None,
    }
}
