//! Environment-driven configuration for the fabric core

use crate::error::{FabricError, Result};
use std::time::Duration;

/// Timing and retry knobs shared by the registry, gateway, and clients.
///
/// The lease duration must be a small multiple of the heartbeat interval so
/// a single missed heartbeat never evicts an instance but consecutive misses
/// do; the constructor enforces the 2x floor.
#[derive(Clone, Debug)]
pub struct FabricConfig {
    pub heartbeat_interval: Duration,
    pub lease_duration: Duration,
    pub eviction_sweep_interval: Duration,
    pub downstream_timeout: Duration,
    pub max_retries: u32,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(10_000),
            lease_duration: Duration::from_millis(30_000),
            eviction_sweep_interval: Duration::from_millis(15_000),
            downstream_timeout: Duration::from_millis(5_000),
            max_retries: 1,
        }
    }
}

impl FabricConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. The env indirection keeps parsing
    /// testable without mutating process-global state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            heartbeat_interval: parse_millis(
                &lookup,
                "HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval,
            )?,
            lease_duration: parse_millis(&lookup, "LEASE_DURATION_MS", defaults.lease_duration)?,
            eviction_sweep_interval: parse_millis(
                &lookup,
                "EVICTION_SWEEP_INTERVAL_MS",
                defaults.eviction_sweep_interval,
            )?,
            downstream_timeout: parse_millis(
                &lookup,
                "DOWNSTREAM_TIMEOUT_MS",
                defaults.downstream_timeout,
            )?,
            max_retries: parse_u32(&lookup, "MAX_RETRIES", defaults.max_retries)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lease_duration < self.heartbeat_interval * 2 {
            return Err(FabricError::Config(format!(
                "LEASE_DURATION_MS ({}) must be at least twice HEARTBEAT_INTERVAL_MS ({})",
                self.lease_duration.as_millis(),
                self.heartbeat_interval.as_millis()
            )));
        }
        Ok(())
    }

    pub fn lease_duration_ms(&self) -> u64 {
        self.lease_duration.as_millis() as u64
    }
}

fn parse_millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| {
                FabricError::Config(format!(
                    "{} must be an integer millisecond value, got {:?}",
                    key, raw
                ))
            }),
        None => Ok(default),
    }
}

fn parse_u32<F>(lookup: &F, key: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            FabricError::Config(format!("{} must be a non-negative integer, got {:?}", key, raw))
        }),
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = FabricConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(10_000));
        assert_eq!(config.lease_duration, Duration::from_millis(30_000));
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn values_are_read_in_milliseconds() {
        let config = FabricConfig::from_lookup(lookup_from(&[
            ("HEARTBEAT_INTERVAL_MS", "2000"),
            ("LEASE_DURATION_MS", "6000"),
            ("DOWNSTREAM_TIMEOUT_MS", "750"),
            ("MAX_RETRIES", "2"),
        ]))
        .unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(2_000));
        assert_eq!(config.lease_duration, Duration::from_millis(6_000));
        assert_eq!(config.downstream_timeout, Duration::from_millis(750));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn lease_shorter_than_twice_heartbeat_is_rejected() {
        let err = FabricConfig::from_lookup(lookup_from(&[
            ("HEARTBEAT_INTERVAL_MS", "10000"),
            ("LEASE_DURATION_MS", "15000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, FabricError::Config(_)));
    }

    #[test]
    fn malformed_value_is_a_config_error() {
        let err =
            FabricConfig::from_lookup(lookup_from(&[("LEASE_DURATION_MS", "30s")])).unwrap_err();
        assert!(matches!(err, FabricError::Config(_)));
    }
}
