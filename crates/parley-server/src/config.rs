use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Duration;

use parley_api::tokens::{DEFAULT_ACCESS_TTL_MINS, DEFAULT_REFRESH_TTL_DAYS};

/// Server configuration read once from the environment at startup.
///
/// | Env Var                   | Default     |
/// |---------------------------|-------------|
/// | `PARLEY_HOST`             | `0.0.0.0`   |
/// | `PARLEY_PORT`             | `3000`      |
/// | `PARLEY_DB_PATH`          | `parley.db` |
/// | `PARLEY_ACCESS_SECRET`    | required    |
/// | `PARLEY_REFRESH_SECRET`   | required    |
/// | `PARLEY_ACCESS_TTL_MINS`  | `15`        |
/// | `PARLEY_REFRESH_TTL_DAYS` | `7`         |
/// | `PARLEY_COOKIE_SECURE`    | `false`     |
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = parse_var("PARLEY_PORT", 3000u16)?;
        let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());

        let access_secret = required_var("PARLEY_ACCESS_SECRET")?;
        let refresh_secret = required_var("PARLEY_REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            bail!("PARLEY_ACCESS_SECRET and PARLEY_REFRESH_SECRET must differ");
        }

        let access_ttl = checked_ttl(
            "PARLEY_ACCESS_TTL_MINS",
            parse_var("PARLEY_ACCESS_TTL_MINS", DEFAULT_ACCESS_TTL_MINS)?,
            Duration::try_minutes,
        )?;
        let refresh_ttl = checked_ttl(
            "PARLEY_REFRESH_TTL_DAYS",
            parse_var("PARLEY_REFRESH_TTL_DAYS", DEFAULT_REFRESH_TTL_DAYS)?,
            Duration::try_days,
        )?;

        let cookie_secure = parse_var("PARLEY_COOKIE_SECURE", false)?;

        Ok(Self {
            host,
            port,
            db_path: PathBuf::from(db_path),
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
            cookie_secure,
        })
    }
}

/// Token expiries are computed as `now + ttl`, so lifetimes are capped well
/// inside the representable date range.
const MAX_TTL_DAYS: i64 = 3650;

fn checked_ttl(name: &str, value: i64, to_duration: fn(i64) -> Option<Duration>) -> Result<Duration> {
    if value <= 0 {
        bail!("{name} must be positive");
    }
    let ttl = to_duration(value).with_context(|| format!("{name} is out of range ({value})"))?;
    if ttl.num_days() > MAX_TTL_DAYS {
        bail!("{name} must not exceed {MAX_TTL_DAYS} days");
    }
    Ok(ttl)
}

fn required_var(name: &str) -> Result<String> {
    let value = std::env::var(name).with_context(|| format!("{name} must be set"))?;
    if value.is_empty() {
        bail!("{name} must not be empty");
    }
    Ok(value)
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} is invalid ({raw}): {e}")),
        Err(_) => Ok(default),
    }
}
