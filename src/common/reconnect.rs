//! Exponential backoff reconnection policy.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use serde::Deserialize;

/// Configuration for exponential backoff reconnection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in seconds.
    pub min_delay_secs: u64,
    /// Maximum delay between retries, in seconds.
    pub max_delay_secs: u64,
    /// Multiplier for each successive attempt.
    pub factor: f32,
    /// Add random jitter to every delay.
    pub jitter: bool,
    /// Maximum number of retries per outage (None = infinite).
    pub max_attempts: Option<usize>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 5,
            max_delay_secs: 300,
            factor: 1.5,
            jitter: true,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    /// Build a fresh backoff iterator for one outage.
    ///
    /// Yields `None` once `max_attempts` retries have been handed out.
    pub fn backoff(&self) -> ExponentialBackoff {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay())
            .with_max_delay(self.max_delay())
            .with_factor(self.factor);

        if self.jitter {
            builder = builder.with_jitter();
        }

        builder = match self.max_attempts {
            Some(max) => builder.with_max_times(max),
            None => builder.without_max_times(),
        };

        builder.build()
    }
}
