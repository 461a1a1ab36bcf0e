use std::{str::FromStr, time::Duration};

use anyhow::{anyhow, Context};

pub const DEFAULT_ROOM_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,

    /// Lifetime given to every new room.
    pub room_ttl: Duration,
    /// Maximum registered tokens per room; `None` is unlimited.
    pub room_capacity: Option<u32>,
    pub sweep_interval: Duration,

    pub secure_cookies: bool,
    pub cors_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_owned(),
            database_url: "sqlite://voidchat.db".to_owned(),
            database_max_connections: 16,
            room_ttl: DEFAULT_ROOM_TTL,
            room_capacity: None,
            sweep_interval: Duration::from_secs(30),
            secure_cookies: false,
            cors_origin: None,
        }
    }
}

impl Config {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let defaults = Config::default();

        let production = lookup("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production"));
        let secure_cookies = match lookup("SECURE_COOKIES") {
            Some(raw) => parse_bool("SECURE_COOKIES", &raw)?,
            None => production,
        };

        Ok(Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", &lookup, defaults.database_max_connections)?,
            room_ttl: Duration::from_secs(parse_or("ROOM_TTL_SECONDS", &lookup, defaults.room_ttl.as_secs())?),
            room_capacity: lookup("ROOM_CAPACITY")
                .map(|raw| parse("ROOM_CAPACITY", &raw))
                .transpose()?,
            sweep_interval: Duration::from_secs(
                parse_or("SWEEP_INTERVAL_SECONDS", &lookup, defaults.sweep_interval.as_secs())?.max(1),
            ),
            secure_cookies,
            cors_origin: lookup("CORS_ORIGIN").filter(|origin| !origin.is_empty()),
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}"))
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key).map_or(Ok(default), |raw| parse(key, &raw))
}

fn parse_bool(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("invalid {key}: {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.room_ttl, DEFAULT_ROOM_TTL);
        assert_eq!(config.room_capacity, None);
        assert!(!config.secure_cookies);
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ROOM_TTL_SECONDS", "120"),
            ("ROOM_CAPACITY", "2"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("CORS_ORIGIN", "https://void.example"),
        ]))
        .unwrap();

        assert_eq!(config.room_ttl, Duration::from_secs(120));
        assert_eq!(config.room_capacity, Some(2));
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.cors_origin.as_deref(), Some("https://void.example"));
    }

    #[test]
    fn production_turns_on_secure_cookies() {
        let config = Config::from_lookup(lookup(&[("APP_ENV", "production")])).unwrap();
        assert!(config.secure_cookies);

        let config = Config::from_lookup(lookup(&[("APP_ENV", "production"), ("SECURE_COOKIES", "false")])).unwrap();
        assert!(!config.secure_cookies);
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = Config::from_lookup(lookup(&[("ROOM_TTL_SECONDS", "ten minutes")])).unwrap_err();
        assert!(err.to_string().contains("ROOM_TTL_SECONDS"));
    }
}
