use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use time::{
    macros::{format_description, offset},
    Date, OffsetDateTime, UtcOffset,
};

/// Day boundaries for every user of an instance are computed in India
/// Standard Time, regardless of the client's locale.
pub const REFERENCE_OFFSET: UtcOffset = offset!(+5:30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DayKeyError {
    #[error("day key must look like YYYY-MM-DD, got `{0}`")]
    Shape(String),
    #[error("`{0}` is not a calendar date")]
    NotADate(String),
}

/// Canonical `YYYY-MM-DD` identifier of a calendar day. Partition key of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(Date);

impl DayKey {
    /// Day containing `at`, evaluated in [`REFERENCE_OFFSET`].
    pub fn from_timestamp(at: OffsetDateTime) -> Self {
        Self(at.to_offset(REFERENCE_OFFSET).date())
    }

    /// Strict parse of a client supplied key.
    pub fn parse(raw: &str) -> Result<Self, DayKeyError> {
        lazy_static! {
            static ref DAY_KEY_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
        }
        let raw = raw.trim();
        if !DAY_KEY_RE.is_match(raw) {
            return Err(DayKeyError::Shape(raw.to_string()));
        }
        Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .map(Self)
            .map_err(|_| DayKeyError::NotADate(raw.to_string()))
    }

    /// The calendar day before this one; `None` only at the minimum representable date.
    pub fn previous(&self) -> Option<Self> {
        self.0.previous_day().map(Self)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl FromStr for DayKey {
    type Err = DayKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn uses_reference_zone_not_utc() {
        // 20:00 UTC is already the next morning in IST.
        let key = DayKey::from_timestamp(datetime!(2024-03-09 20:00 UTC));
        assert_eq!(key.to_string(), "2024-03-10");

        let key = DayKey::from_timestamp(datetime!(2024-03-09 18:29 UTC));
        assert_eq!(key.to_string(), "2024-03-09");
    }

    #[test]
    fn same_instant_same_key_from_any_offset() {
        let utc = DayKey::from_timestamp(datetime!(2024-07-01 23:30 UTC));
        let pacific = DayKey::from_timestamp(datetime!(2024-07-01 16:30 -7));
        assert_eq!(utc, pacific);
    }

    #[test]
    fn parse_accepts_canonical_and_rejects_garbage() {
        assert_eq!(DayKey::parse("2024-02-29").unwrap().to_string(), "2024-02-29");
        assert_eq!(
            DayKey::parse("2024-2-9"),
            Err(DayKeyError::Shape("2024-2-9".into()))
        );
        assert_eq!(
            DayKey::parse("2023-02-29"),
            Err(DayKeyError::NotADate("2023-02-29".into()))
        );
    }

    #[test]
    fn previous_crosses_month_and_year() {
        let key = DayKey::parse("2024-01-01").unwrap();
        assert_eq!(key.previous().unwrap().to_string(), "2023-12-31");
    }

    #[test]
    fn serde_uses_plain_string() {
        let key = DayKey::parse("2025-11-04").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2025-11-04\"");
        let back: DayKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<DayKey>("\"04/11/2025\"").is_err());
    }
}
