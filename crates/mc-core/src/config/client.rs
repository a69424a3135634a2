//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration for the chat client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chat server hostname
    pub host: String,

    /// Port broadcasting the chat stream
    pub listen_port: u16,

    /// Port accepting authenticated submissions
    pub send_port: u16,

    /// JSON file holding the account token
    pub token_file: PathBuf,

    /// File that receives every chat line
    pub history_file: PathBuf,

    /// TCP connect timeout for both sockets
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Idle time on the outbound queue before a heartbeat is sent
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// How long to wait for the server prompt after each submission
    #[serde(with = "duration_secs")]
    pub ack_timeout: Duration,

    /// How long sibling tasks get to clean up after a failure before being aborted
    #[serde(with = "duration_secs")]
    pub drain_timeout: Duration,

    /// Liveness watchdog settings
    pub watchdog: WatchdogConfig,

    /// Delay policy between generations
    pub reconnect: ReconnectConfig,

    /// Delay policy for the read-only `listen` mode
    pub listen_reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "minechat.dvmn.org".to_string(),
            listen_port: 5000,
            send_port: 5050,
            token_file: PathBuf::from("minechat_token.json"),
            history_file: PathBuf::from("chat_history.txt"),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_millis(500),
            watchdog: WatchdogConfig::default(),
            reconnect: ReconnectConfig::default(),
            listen_reconnect: ReconnectConfig::Exponential(BackoffConfig::default()),
        }
    }
}

impl ClientConfig {
    /// Address of the broadcast port
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.listen_port)
    }

    /// Address of the submission port
    pub fn send_address(&self) -> String {
        format!("{}:{}", self.host, self.send_port)
    }

    /// Reject values that parse but cannot drive the client
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "watchdog.idle_timeout must be greater than zero".to_string(),
            ));
        }
        if self.watchdog.max_consecutive_misses == 0 {
            return Err(ConfigError::Invalid(
                "watchdog.max_consecutive_misses must be at least 1".to_string(),
            ));
        }
        self.reconnect.validate("reconnect")?;
        self.listen_reconnect.validate("listen_reconnect")
    }
}

/// Liveness watchdog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Length of one observation interval
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,

    /// Consecutive silent intervals that count as a dead connection
    pub max_consecutive_misses: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        // Ten one-second ticks outlast a heartbeat interval plus its ack
        Self {
            idle_timeout: Duration::from_secs(1),
            max_consecutive_misses: 10,
        }
    }
}

/// Reconnection delay policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ReconnectConfig {
    /// Same delay before every attempt
    Fixed {
        #[serde(with = "duration_secs")]
        delay: Duration,
    },
    /// Capped exponential backoff with jitter
    Exponential(BackoffConfig),
}

impl ReconnectConfig {
    /// Validate the backoff parameters; `section` names the table in errors
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        match self {
            ReconnectConfig::Fixed { .. } => Ok(()),
            ReconnectConfig::Exponential(backoff) => backoff
                .validate()
                .map_err(|reason| ConfigError::Invalid(format!("{}: {}", section, reason))),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig::Fixed {
            delay: Duration::from_secs(1),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// A generation that stays up this long resets the delay to `initial`
    #[serde(with = "duration_secs")]
    pub stable_after: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.0,
            stable_after: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    /// Check the multiplier, jitter and bounds.
    ///
    /// Returns the reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "multiplier must be a finite number of at least 1.0, got {}",
                self.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!("jitter must be between 0.0 and 1.0, got {}", self.jitter));
        }
        if self.initial > self.max {
            return Err(format!(
                "initial delay {:?} is larger than max {:?}",
                self.initial, self.max
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.listen_address(), "minechat.dvmn.org:5000");
        assert_eq!(config.send_address(), "minechat.dvmn.org:5050");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.ack_timeout, Duration::from_secs(2));
        assert!(matches!(config.reconnect, ReconnectConfig::Fixed { .. }));
        assert!(matches!(
            config.listen_reconnect,
            ReconnectConfig::Exponential(_)
        ));
    }

    #[test]
    fn test_watchdog_outlasts_heartbeat() {
        let config = ClientConfig::default();
        let window = config.watchdog.idle_timeout * config.watchdog.max_consecutive_misses;
        assert!(window > config.heartbeat_interval + config.ack_timeout);
    }

    #[test]
    fn test_partial_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            host = "localhost"
            ack_timeout = 0.5

            [watchdog]
            max_consecutive_misses = 3

            [reconnect]
            policy = "exponential"
            initial = 1
            max = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.send_port, 5050);
        assert_eq!(config.ack_timeout, Duration::from_millis(500));
        assert_eq!(config.watchdog.max_consecutive_misses, 3);
        assert_eq!(config.watchdog.idle_timeout, Duration::from_secs(1));
        match config.reconnect {
            ReconnectConfig::Exponential(backoff) => {
                assert_eq!(backoff.initial, Duration::from_secs(1));
                assert_eq!(backoff.max, Duration::from_secs(30));
                assert_eq!(backoff.multiplier, 2.0);
            }
            other => panic!("Expected exponential policy, got {:?}", other),
        }
    }

    #[test]
    fn test_fixed_policy_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            [reconnect]
            policy = "fixed"
            delay = 3
            "#,
        )
        .unwrap();
        match config.reconnect {
            ReconnectConfig::Fixed { delay } => assert_eq!(delay, Duration::from_secs(3)),
            other => panic!("Expected fixed policy, got {:?}", other),
        }
    }

    fn listen_backoff(table: &str) -> ClientConfig {
        toml::from_str(&format!("[listen_reconnect]\npolicy = \"exponential\"\n{}\n", table)).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        ClientConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_out_of_range_multiplier() {
        for table in ["multiplier = -1.0", "multiplier = 0.5", "multiplier = nan", "multiplier = inf"] {
            let err = listen_backoff(table).validate().unwrap_err();
            match err {
                ConfigError::Invalid(reason) => {
                    assert!(reason.starts_with("listen_reconnect: multiplier"), "{}", reason)
                }
                other => panic!("Expected invalid config for {}, got {:?}", table, other),
            }
        }
    }

    #[test]
    fn test_large_multiplier_is_accepted() {
        // Growth saturates at `max`, so a huge multiplier is only aggressive
        listen_backoff("multiplier = 1e30").validate().unwrap();
    }

    #[test]
    fn test_rejects_out_of_range_jitter() {
        for table in ["jitter = -0.1", "jitter = 1.5", "jitter = nan"] {
            let err = listen_backoff(table).validate().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(ref reason) if reason.contains("jitter")));
        }
    }

    #[test]
    fn test_rejects_initial_above_max() {
        let err = listen_backoff("initial = 90\nmax = 60").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref reason) if reason.contains("initial delay")));
    }

    #[test]
    fn test_rejects_zero_watchdog() {
        let mut config = ClientConfig::default();
        config.watchdog.max_consecutive_misses = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ClientConfig::default();
        config.watchdog.idle_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
