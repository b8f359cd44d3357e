use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Duration;

/// JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Longest TTL accepted for invites and tokens. Keeps `now + ttl` far from
/// the edge of the representable date range.
const MAX_TTL_DAYS: i64 = 3650;

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub invite_ttl: Duration,
    pub purge_interval_secs: u64,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("DUET_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("DUET_JWT_SECRET is unset or still a placeholder");
        }

        let parse = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(raw) => raw.trim().parse().with_context(|| format!("{key} is not a number")),
                None => Ok(default),
            }
        };
        let ttl = |key: &str, default: u64, unit: fn(i64) -> Option<Duration>| -> Result<Duration> {
            let value = parse(key, default)?;
            let ttl = i64::try_from(value)
                .ok()
                .and_then(unit)
                .with_context(|| format!("{key} is out of range"))?;
            if ttl <= Duration::zero() {
                bail!("{key} must be positive");
            }
            if ttl > Duration::days(MAX_TTL_DAYS) {
                bail!("{key} must not exceed {MAX_TTL_DAYS} days");
            }
            Ok(ttl)
        };

        let port = parse("DUET_PORT", 3000)?;
        let port = u16::try_from(port).context("DUET_PORT is out of range")?;
        let purge_interval_secs = parse("DUET_INVITE_PURGE_SECS", 3600)?;
        if purge_interval_secs == 0 {
            bail!("DUET_INVITE_PURGE_SECS must be positive");
        }

        Ok(Self {
            jwt_secret,
            db_path: lookup("DUET_DB_PATH").unwrap_or_else(|| "duet.db".into()).into(),
            host: lookup("DUET_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            invite_ttl: ttl("DUET_INVITE_TTL_DAYS", 7, Duration::try_days)?,
            purge_interval_secs,
            access_ttl: ttl("DUET_ACCESS_TTL_HOURS", 24, Duration::try_hours)?,
            refresh_ttl: ttl("DUET_REFRESH_TTL_DAYS", 30, Duration::try_days)?,
        })
    }
}
