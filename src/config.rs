use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://relay.db?mode=rwc";
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub database_url: String,
    /// messages delivered to a joiner
    pub history_limit: u32,
    /// slack added to the join instant when selecting backfill
    pub history_tolerance: Duration,
    /// unanswered calls are torn down after this long
    pub ring_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_tolerance: Duration::from_millis(500),
            ring_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Reads the process environment, including a `.env` file if present.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            bind: parse_or(&lookup, "RELAY_BIND", defaults.bind)?,
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            history_limit: parse_or(&lookup, "HISTORY_LIMIT", defaults.history_limit)?,
            history_tolerance: Duration::from_millis(
                parse_or(&lookup, "HISTORY_TOLERANCE_MS", defaults.history_tolerance.as_millis() as u64)?,
            ),
            ring_timeout: Duration::from_secs(
                parse_or(&lookup, "RING_TIMEOUT_SECS", defaults.ring_timeout.as_secs())?,
            ),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.ring_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("RELAY_BIND", "127.0.0.1:9000"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("HISTORY_LIMIT", "10"),
            ("RING_TIMEOUT_SECS", "5"),
            ("HISTORY_TOLERANCE_MS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.ring_timeout, Duration::from_secs(5));
        assert_eq!(config.history_tolerance, Duration::ZERO);
    }

    #[test]
    fn bad_value_is_an_error() {
        let err = Config::from_lookup(lookup(&[("HISTORY_LIMIT", "lots")])).unwrap_err();
        assert!(err.to_string().contains("HISTORY_LIMIT"));
    }
}
