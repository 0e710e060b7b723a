use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;
const DEFAULT_INVALIDATION_CHANNEL: &str = "flags:invalidate";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub database_max_connections: u32,
    pub connect_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
    pub invalidation_channel: String,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv().is_ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any name -> value lookup. `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT").ok_or(ConfigError::Missing("PORT"))?;
        let port = parse("PORT", port)?;

        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let redis_url = lookup("REDIS_URL").filter(|url| !url.is_empty());

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            database_url,
            redis_url,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            connect_timeout_secs: parse_or(
                &lookup,
                "CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            cache_ttl_secs: parse_or(&lookup, "FLAG_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?,
            cache_capacity: parse_or(&lookup, "FLAG_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?,
            invalidation_channel: lookup("FLAG_INVALIDATION_CHANNEL")
                .unwrap_or_else(|| DEFAULT_INVALIDATION_CHANNEL.to_string()),
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => parse(name, value),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/flags"),
        ]))
        .unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.redis_url, None);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.invalidation_channel, "flags:invalidate");
        assert!(config.run_migrations);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "3000"),
            ("DATABASE_URL", "postgres://db/flags"),
            ("REDIS_URL", "redis://queue:6379"),
            ("FLAG_CACHE_TTL_SECS", "0"),
            ("RUN_MIGRATIONS", "false"),
        ]))
        .unwrap();

        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.redis_url.as_deref(), Some("redis://queue:6379"));
        assert_eq!(config.cache_ttl_secs, 0);
        assert!(!config.run_migrations);
    }

    #[test]
    fn test_missing_port() {
        let err = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://db")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("PORT"));
    }

    #[test]
    fn test_invalid_port() {
        let err = Config::from_lookup(lookup_from(&[
            ("PORT", "seventy"),
            ("DATABASE_URL", "postgres://db"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn test_empty_redis_url_is_unset() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "1"),
            ("DATABASE_URL", "postgres://db"),
            ("REDIS_URL", ""),
        ]))
        .unwrap();
        assert_eq!(config.redis_url, None);
    }
}
