//! UTC datetime and the opaque internal timestamp.

use std::fmt;

use chrono::{TimeZone, Utc};

/// A UTC instant, stored as nanoseconds since the Unix epoch so it composes
/// with host time facilities without losing precision.
///
/// On the wire this is the millisecond datetime element (0x09): encoding
/// divides by 1,000,000 and decoding multiplies by 1,000,000.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(i64);

impl DateTime {
    /// The current time, at millisecond granularity.
    pub fn now() -> DateTime {
        DateTime::from_millis(Utc::now().timestamp_millis())
    }

    pub fn from_nanos(nanos: i64) -> DateTime {
        DateTime(nanos)
    }

    pub fn from_millis(millis: i64) -> DateTime {
        DateTime(millis.saturating_mul(1_000_000))
    }

    /// Nanoseconds since the Unix epoch.
    pub fn nanos(self) -> i64 {
        self.0
    }

    /// Milliseconds since the Unix epoch; this is what gets encoded.
    pub fn millis(self) -> i64 {
        self.0 / 1_000_000
    }

    pub fn from_chrono(dt: chrono::DateTime<Utc>) -> DateTime {
        DateTime::from_millis(dt.timestamp_millis())
    }

    pub fn to_chrono(self) -> chrono::DateTime<Utc> {
        match Utc.timestamp_millis_opt(self.millis()) {
            chrono::LocalResult::Single(dt) => dt,
            _ => chrono::DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_chrono().to_rfc3339())
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(dt: chrono::DateTime<Utc>) -> DateTime {
        DateTime::from_chrono(dt)
    }
}

/// The opaque 0x11 timestamp element, passed through verbatim. The server
/// uses it for internal replication bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);
