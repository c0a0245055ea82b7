use std::time::Duration;

use crate::reconnect::ReconnectConfig;

/// Connection manager configuration.
///
/// All fields have defaults suitable for local development. Override
/// via environment variables with [`RealtimeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// HTTP base URL of the backend (default: `http://localhost:8000`).
    pub api_url: String,
    /// Path prefix of the project channels (default: `/ws`).
    pub ws_path: String,
    /// Period of the client ping on each open channel.
    pub heartbeat_interval: Duration,
    /// Period of the staleness check on each open channel.
    pub stale_check_interval: Duration,
    /// Silence longer than this marks a channel stale.
    pub stale_threshold: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            ws_path: "/ws".into(),
            heartbeat_interval: Duration::from_secs(15),
            stale_check_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(45),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `TORGMAN_API_URL`              | `http://localhost:8000` |
    /// | `TORGMAN_WS_PATH`              | `/ws`                   |
    /// | `HEARTBEAT_INTERVAL_SECS`      | `15`                    |
    /// | `STALE_CHECK_INTERVAL_SECS`    | `30`                    |
    /// | `STALE_THRESHOLD_SECS`         | `45`                    |
    /// | `RECONNECT_MAX_ATTEMPTS`       | `5`                     |
    /// | `RECONNECT_DELAY_SECS`         | `3`                     |
    /// | `RECONNECT_MAX_DELAY_SECS`     | `30`                    |
    /// | `RECONNECT_BACKOFF_MULTIPLIER` | `1.0`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("TORGMAN_API_URL").unwrap_or(defaults.api_url);
        let ws_path = lookup("TORGMAN_WS_PATH").unwrap_or(defaults.ws_path);

        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(raw) => parse::<u64>(key, &raw).map(Duration::from_secs),
                None => Ok(default),
            }
        };

        let heartbeat_interval = secs("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval)?;
        let stale_check_interval =
            secs("STALE_CHECK_INTERVAL_SECS", defaults.stale_check_interval)?;
        let stale_threshold = secs("STALE_THRESHOLD_SECS", defaults.stale_threshold)?;

        let max_attempts = match lookup("RECONNECT_MAX_ATTEMPTS") {
            Some(raw) => parse::<u32>("RECONNECT_MAX_ATTEMPTS", &raw)?,
            None => defaults.reconnect.max_attempts,
        };
        let initial_delay = secs("RECONNECT_DELAY_SECS", defaults.reconnect.initial_delay)?;
        let max_delay = secs("RECONNECT_MAX_DELAY_SECS", defaults.reconnect.max_delay)?;
        let multiplier = match lookup("RECONNECT_BACKOFF_MULTIPLIER") {
            Some(raw) => parse::<f64>("RECONNECT_BACKOFF_MULTIPLIER", &raw)?,
            None => defaults.reconnect.multiplier,
        };

        for (key, value) in [
            ("HEARTBEAT_INTERVAL_SECS", heartbeat_interval),
            ("STALE_CHECK_INTERVAL_SECS", stale_check_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(ConfigError::Invalid {
                key: "RECONNECT_BACKOFF_MULTIPLIER",
                reason: "must be a finite number >= 1.0".into(),
            });
        }

        Ok(Self {
            api_url,
            ws_path,
            heartbeat_interval,
            stale_check_interval,
            stale_threshold,
            reconnect: ReconnectConfig {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            },
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: format!("{raw:?}: {e}"),
    })
}

/// A configuration value could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
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
    fn empty_environment_gives_defaults() {
        let config = RealtimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.stale_check_interval, Duration::from_secs(30));
        assert_eq!(config.stale_threshold, Duration::from_secs(45));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(3));
    }

    #[test]
    fn overrides_are_applied() {
        let config = RealtimeConfig::from_lookup(lookup(&[
            ("TORGMAN_API_URL", "https://subs.example.com"),
            ("HEARTBEAT_INTERVAL_SECS", "5"),
            ("RECONNECT_MAX_ATTEMPTS", "2"),
            ("RECONNECT_BACKOFF_MULTIPLIER", "2.5"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://subs.example.com");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.multiplier, 2.5);
    }

    #[test]
    fn bad_number_is_reported_with_key() {
        let err = RealtimeConfig::from_lookup(lookup(&[("STALE_THRESHOLD_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("STALE_THRESHOLD_SECS"));
    }

    #[test]
    fn zero_heartbeat_rejected() {
        assert!(RealtimeConfig::from_lookup(lookup(&[("HEARTBEAT_INTERVAL_SECS", "0")])).is_err());
    }

    #[test]
    fn shrinking_multiplier_rejected() {
        assert!(
            RealtimeConfig::from_lookup(lookup(&[("RECONNECT_BACKOFF_MULTIPLIER", "0.5")]))
                .is_err()
        );
    }
}
