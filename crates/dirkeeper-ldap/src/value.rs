//! Typed attribute values and their JSON rendering.

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attributes whose values are LDAP GeneralizedTime strings.
const TIMESTAMP_ATTRIBUTES: &[&str] = &[
    "createTimestamp",
    "modifyTimestamp",
    "lastLoginTime",
    "passwordExpirationTime",
    "passwordAllowChangeTime",
    "passwordGraceUserTime",
    "pwdChangedTime",
    "pwdAccountLockedTime",
    "accountUnlockTime",
    "currentTime",
    "startTime",
];

/// A value produced while normalizing entries or computing account status.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryValue {
    /// Plain text.
    Text(String),
    /// Whole number (durations in seconds, counters).
    Integer(i64),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Ordered values.
    List(Vec<DirectoryValue>),
    /// Named values.
    Map(BTreeMap<String, DirectoryValue>),
}

impl DirectoryValue {
    /// Wraps one raw attribute value, parsing it as a timestamp when the attribute is known to
    /// carry GeneralizedTime and the text parses.
    #[must_use]
    pub fn from_attribute(attribute: &str, raw: &str) -> Self {
        if is_timestamp_attribute(attribute) {
            if let Some(time) = parse_generalized_time(raw) {
                return Self::Timestamp(time);
            }
        }
        Self::Text(raw.to_string())
    }

    /// Converts to JSON, rendering every nested timestamp as RFC 3339 text.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Integer(number) => Value::from(*number),
            Self::Timestamp(time) => Value::String(time.to_rfc3339()),
            Self::List(values) => Value::Array(values.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

impl From<DirectoryValue> for Value {
    fn from(value: DirectoryValue) -> Self {
        value.to_json()
    }
}

impl From<&str> for DirectoryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DirectoryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for DirectoryValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<DateTime<Utc>> for DirectoryValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Returns true if the attribute is known to hold GeneralizedTime values.
#[must_use]
pub(crate) fn is_timestamp_attribute(attribute: &str) -> bool {
    TIMESTAMP_ATTRIBUTES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(attribute))
}

/// Parses LDAP GeneralizedTime (`20240131120000Z`, optional fraction, `Z` or `±hhmm`).
#[must_use]
pub(crate) fn parse_generalized_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.len() < 15 || !raw.is_char_boundary(14) {
        return None;
    }

    let (stamp, rest) = raw.split_at(14);
    let base = NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S").ok()?;

    let (fraction, zone) = match rest.strip_prefix(['.', ',']) {
        Some(tail) => {
            let digits = tail.chars().take_while(char::is_ascii_digit).count();
            tail.split_at(digits)
        }
        None => ("", rest),
    };

    let nanos = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<9}");
        padded.get(..9)?.parse::<u32>().ok()?
    };
    let base = base.with_nanosecond(nanos)?;

    let offset_secs = match zone {
        "Z" | "z" => 0,
        _ => {
            let (sign, digits) = match zone.as_bytes().first()? {
                b'+' => (1, &zone[1..]),
                b'-' => (-1, &zone[1..]),
                _ => return None,
            };
            if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let hours: i32 = digits[..2].parse().ok()?;
            let minutes: i32 = digits[2..].parse().ok()?;
            sign * (hours * 3600 + minutes * 60)
        }
    };

    let utc = base - chrono::Duration::seconds(i64::from(offset_secs));
    Some(Utc.from_utc_datetime(&utc))
}
