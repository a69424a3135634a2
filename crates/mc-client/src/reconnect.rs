//! Reconnect delays between session generations

use std::time::Duration;

use mc_core::config::{BackoffConfig, ReconnectConfig};

/// Exponential backoff with jitter for reconnection attempts
pub struct ExponentialBackoff {
    /// Current delay
    current: Duration,
    /// Maximum delay
    max: Duration,
    /// Multiplier
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new backoff from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial, config.max, config.multiplier, config.jitter)
    }

    /// Create a new backoff with custom parameters
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            current: initial,
            max,
            multiplier,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        // Overflow, NaN and negative products all saturate at the cap
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.current = std::cmp::min(next, self.max);

        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return delay;
        }
        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::try_from_secs_f64(jitter_amount).unwrap_or(Duration::ZERO)
    }

    /// Reset the backoff to initial delay
    pub fn reset(&mut self, initial: Duration) {
        self.current = initial;
    }
}

/// How long the supervisor waits before starting the next generation
pub enum ReconnectPolicy {
    /// Same pause after every failure
    Fixed(Duration),
    /// Growing pause, reset once a generation stays up for `stable_after`
    Exponential {
        backoff: ExponentialBackoff,
        initial: Duration,
        stable_after: Duration,
    },
}

impl ReconnectPolicy {
    /// Build the policy described by a `[reconnect]` table
    pub fn from_config(config: &ReconnectConfig) -> Self {
        match config {
            ReconnectConfig::Fixed { delay } => Self::Fixed(*delay),
            ReconnectConfig::Exponential(backoff) => Self::Exponential {
                backoff: ExponentialBackoff::from_config(backoff),
                initial: backoff.initial,
                stable_after: backoff.stable_after,
            },
        }
    }

    /// Delay before the next attempt, given how long the failed generation ran
    pub fn next_delay(&mut self, uptime: Duration) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential {
                backoff,
                initial,
                stable_after,
            } => {
                if uptime >= *stable_after {
                    backoff.reset(*initial);
                }
                backoff.next_delay()
            }
        }
    }
}
