use std::convert::TryFrom;
use std::time::{Duration, SystemTime};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Formats a `SystemTime` as an RFC 3339 string.
///
/// Times before the unix epoch format as an empty string.
pub fn to_rfc3339(st: &SystemTime) -> String {
    st.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .and_then(|duration| TryFrom::try_from(duration).ok())
        .and_then(|duration| OffsetDateTime::UNIX_EPOCH.checked_add(duration))
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_default()
}

/// The current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    to_rfc3339(&SystemTime::now())
}

fn from_rfc3339(value: &str) -> Option<SystemTime> {
    let dt = OffsetDateTime::parse(value, &Rfc3339).ok()?;
    let secs = u64::try_from(dt.unix_timestamp()).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(Duration::new(secs, dt.nanosecond()))
}

pub mod ts_rfc3339 {
    use std::fmt;

    use serde::{de, ser};

    use super::*;

    pub fn deserialize<'de, D>(d: D) -> Result<SystemTime, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        d.deserialize_str(Rfc3339Deserializer)
    }

    pub fn serialize<S>(st: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match to_rfc3339(st) {
            formatted if !formatted.is_empty() => serializer.serialize_str(&formatted),
            _ => Err(ser::Error::custom(format!(
                "invalid `SystemTime` instance: {:?}",
                st
            ))),
        }
    }

    struct Rfc3339Deserializer;

    impl de::Visitor<'_> for Rfc3339Deserializer {
        type Value = SystemTime;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "an RFC3339 timestamp")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            from_rfc3339(v).ok_or_else(|| E::custom(format!("invalid timestamp: {}", v)))
        }
    }
}

pub mod ts_rfc3339_opt {
    use serde::{de, ser};

    use super::*;

    pub fn deserialize<'de, D>(d: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        ts_rfc3339::deserialize(d).map(Some)
    }

    pub fn serialize<S>(st: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match st {
            Some(st) => ts_rfc3339::serialize(st, serializer),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_roundtrip_through_string() {
        let st = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let formatted = to_rfc3339(&st);
        assert_eq!(formatted, "2020-09-13T12:26:40Z");
        assert_eq!(from_rfc3339(&formatted), Some(st));
    }

    #[test]
    fn test_pre_epoch_formats_empty() {
        let st = SystemTime::UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(to_rfc3339(&st), "");
    }
}
