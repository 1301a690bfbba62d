use std::time::Duration;

use backoff::{exponential::ExponentialBackoffBuilder, ExponentialBackoff};

/// Retry policy for transient failures of the evaluation service.
#[derive(Clone, Debug)]
pub struct RetryConfiguration {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed_time: Option<Duration>,
    /// How long to wait before retrying when the server looks like it is restarting.
    server_restart_duration: Duration,
}

impl Default for RetryConfiguration {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(250),
            // increase backoff time by 75% each failure
            multiplier: 1.75,
            max_interval: Duration::from_secs(30),
            // evaluating a block is expensive, give up after two minutes
            max_elapsed_time: Some(Duration::from_secs(125)),
            server_restart_duration: Duration::from_secs(120),
        }
    }
}

impl RetryConfiguration {
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        server_restart_duration: Duration,
    ) -> Self {
        Self {
            initial_interval,
            multiplier,
            max_interval,
            max_elapsed_time,
            server_restart_duration,
        }
    }

    /// Never retries.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO, Some(Duration::ZERO), Duration::ZERO)
    }

    pub fn server_restart_duration(&self) -> Duration {
        self.server_restart_duration
    }

    pub fn max_elapsed_time(&self) -> Option<Duration> {
        self.max_elapsed_time
    }

    pub(crate) fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(self.max_elapsed_time)
            .build()
    }
}
