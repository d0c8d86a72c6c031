use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::ValidationError;

const EPOCH_RFC3339: &str = "1970-01-01T00:00:00Z";

/// UTC instant, serialized as RFC3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub const fn epoch() -> Self {
        Self(OffsetDateTime::UNIX_EPOCH)
    }

    /// Parses RFC3339 (any offset, normalized to UTC) or the service's
    /// `YYYY-MM-DD HH:MM:SS` form, which is taken as UTC.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let invalid = || ValidationError::InvalidTimestamp {
            value: input.to_owned(),
        };
        if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            return Self::in_range(parsed.to_offset(time::UtcOffset::UTC)).ok_or_else(invalid);
        }

        let service_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        PrimitiveDateTime::parse(trimmed, service_format)
            .ok()
            .and_then(|value| Self::in_range(value.assume_utc()))
            .ok_or_else(invalid)
    }

    /// Values outside years 0000 to 9999 fall back to the epoch.
    pub fn from_unix_millis(millis: i64) -> Self {
        let nanos = i128::from(millis) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(Self::in_range)
            .unwrap_or_else(Self::epoch)
    }

    // RFC3339 has no representation for years outside 0000..=9999.
    fn in_range(value: OffsetDateTime) -> Option<Self> {
        (0..=9999).contains(&value.year()).then_some(Self(value))
    }

    pub fn unix_millis(self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }

    pub fn date(self) -> Date {
        self.0.date()
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| EPOCH_RFC3339.to_owned())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
