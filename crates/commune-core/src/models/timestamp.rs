//! Timestamp normalization
//!
//! Remote documents encode times in several shapes. They are decoded into
//! [`RemoteTimestamp`] and immediately normalized into [`Timestamp`] at the
//! document boundary; the rest of the crate only ever sees [`Timestamp`].

use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Unix epoch milliseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The earliest representable time; unresolvable timestamps map here.
    pub const EPOCH: Self = Self(0);

    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Render as `YYYY-MM-DD HH:MM:SS UTC`, falling back to raw millis.
    #[must_use]
    pub fn to_utc_label(self) -> String {
        DateTime::from_timestamp_millis(self.0).map_or_else(
            || self.0.to_string(),
            |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire shapes a document timestamp may arrive in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteTimestamp {
    /// Server-assigned timestamp object.
    Server {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(alias = "_nanoseconds", default)]
        nanoseconds: u32,
    },
    /// Integer milliseconds since the epoch.
    Millis(i64),
    /// ISO-8601 / RFC 3339 string.
    Iso(String),
    /// Anything else; normalizes to [`Timestamp::EPOCH`].
    Other(serde_json::Value),
}

impl RemoteTimestamp {
    /// Normalize into epoch milliseconds.
    #[must_use]
    pub fn normalize(&self) -> Timestamp {
        match self {
            Self::Server {
                seconds,
                nanoseconds,
            } => seconds
                .checked_mul(1000)
                .and_then(|millis| millis.checked_add(i64::from(*nanoseconds / 1_000_000)))
                .map_or(Timestamp::EPOCH, Timestamp),
            Self::Millis(millis) => Timestamp(*millis),
            Self::Iso(raw) => parse_iso(raw).unwrap_or(Timestamp::EPOCH),
            Self::Other(_) => Timestamp::EPOCH,
        }
    }
}

impl From<Timestamp> for RemoteTimestamp {
    fn from(value: Timestamp) -> Self {
        Self::Millis(value.0)
    }
}

/// Normalize an optional wire timestamp; a missing value is the epoch.
#[must_use]
pub fn normalize_optional(value: Option<&RemoteTimestamp>) -> Timestamp {
    value.map_or(Timestamp::EPOCH, RemoteTimestamp::normalize)
}

fn parse_iso(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(Timestamp(parsed.timestamp_millis()));
    }
    // Offset-less strings are treated as UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Timestamp(naive.and_utc().timestamp_millis()))
}
