use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use msgpump::{ChannelConfig, DriverConfig, FailurePolicy, Overflow, QuitPolicy};

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub channel: ChannelConfig,
    pub driver: DriverConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let capacity = lookup("PUMP_CHANNEL_CAPACITY")
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .context("PUMP_CHANNEL_CAPACITY must be a positive number")?;
        let overflow: Overflow = parse_or_default(&lookup, "PUMP_OVERFLOW")?;

        Ok(Self {
            channel: match capacity {
                Some(capacity) => ChannelConfig::bounded(capacity, overflow),
                None => ChannelConfig::unbounded(),
            },
            driver: DriverConfig {
                quit_policy: parse_or_default(&lookup, "PUMP_QUIT_POLICY")?,
                on_handler_error: parse_or_default::<FailurePolicy>(&lookup, "PUMP_ON_HANDLER_ERROR")?,
            },
        })
    }
}

fn parse_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<T>
where
    T: FromStr<Err = String> + Default,
{
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|e: String| anyhow!(e))
            .with_context(|| format!("{} is invalid", key)),
        None => Ok(T::default()),
    }
}
