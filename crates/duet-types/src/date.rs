use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, de};

/// Accepts a calendar day either bare (`2024-01-01`) or as a full RFC 3339
/// timestamp, in which case only its date part is kept. Clients send both.
pub fn calendar_day<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_day(&raw).ok_or_else(|| {
        de::Error::custom(format!("expected YYYY-MM-DD or an RFC 3339 timestamp, got '{raw}'"))
    })
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    raw.parse::<NaiveDate>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
