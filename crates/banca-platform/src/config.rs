use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_MOVEMENTS_CHANNEL: &str = "movements.events";
const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub movements_channel: String,
    pub scheduler_interval: Duration,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |key| std::env::var(key).ok())
    }

    pub fn worker_from_env() -> Result<Self> {
        Self::from_lookup("", |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        default_http_addr: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = lookup("REDIS_URL").context("REDIS_URL is required")?;
        let http_addr = lookup("HTTP_ADDR").unwrap_or_else(|| default_http_addr.to_string());
        let movements_channel =
            lookup("MOVEMENTS_CHANNEL").unwrap_or_else(|| DEFAULT_MOVEMENTS_CHANNEL.to_string());
        let interval_secs = match lookup("SCHEDULER_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("SCHEDULER_INTERVAL_SECS must be whole seconds, got {raw}"))?,
            None => DEFAULT_SCHEDULER_INTERVAL_SECS,
        };
        if interval_secs == 0 {
            anyhow::bail!("SCHEDULER_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            movements_channel,
            scheduler_interval: Duration::from_secs(interval_secs),
        })
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
    fn defaults_fill_optional_settings() {
        let config = ServiceConfig::from_lookup(
            "0.0.0.0:8080",
            lookup(&[("DATABASE_URL", "postgres://db"), ("REDIS_URL", "redis://bus")]),
        )
        .unwrap();

        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.movements_channel, "movements.events");
        assert_eq!(config.scheduler_interval, Duration::from_secs(60));
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = ServiceConfig::from_lookup("", lookup(&[("REDIS_URL", "redis://bus")]))
            .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn interval_must_be_positive_seconds() {
        let vars = [
            ("DATABASE_URL", "postgres://db"),
            ("REDIS_URL", "redis://bus"),
            ("SCHEDULER_INTERVAL_SECS", "0"),
        ];
        assert!(ServiceConfig::from_lookup("", lookup(&vars)).is_err());

        let vars = [
            ("DATABASE_URL", "postgres://db"),
            ("REDIS_URL", "redis://bus"),
            ("SCHEDULER_INTERVAL_SECS", "soon"),
        ];
        assert!(ServiceConfig::from_lookup("", lookup(&vars)).is_err());
    }
}
