use chrono::{DateTime, SecondsFormat, Utc};

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Fixed-width RFC 3339 text so stored timestamps sort lexicographically.
pub fn to_db_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn from_db_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|value| value.with_timezone(&Utc))
}
