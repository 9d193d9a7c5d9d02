//! Reconnect delay policy.
//!
//! Capped exponential without jitter: the first retry waits
//! `max(sample_period, 100 ms)`, each further retry doubles the wait up to
//! `max(sample_period, 5 s)`. A retry never comes sooner than one sample
//! period.

use std::time::Duration;

use ::backoff::ExponentialBackoff;
use ::backoff::backoff::Backoff;

/// Lower bound of the first reconnect delay.
pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Upper bound of any reconnect delay (unless the sample period is longer).
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Delay generator used while the scheduler is reconnecting.
#[derive(Debug)]
pub struct ReconnectBackoff {
    inner: ExponentialBackoff,
    floor: Duration,
    ceiling: Duration,
}

impl ReconnectBackoff {
    /// Build the policy for an endpoint polled every `sample_period`.
    pub fn new(sample_period: Duration) -> Self {
        let floor = sample_period;
        let initial = RECONNECT_INITIAL_DELAY.max(floor);
        let ceiling = RECONNECT_MAX_DELAY.max(floor);

        let mut inner = ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: ceiling,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        inner.reset();

        Self {
            inner,
            floor,
            ceiling,
        }
    }

    /// Delay before the next reconnect attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.inner
            .next_backoff()
            .unwrap_or(self.ceiling)
            .clamp(self.floor, self.ceiling)
    }

    /// Start over from the initial delay, after a successful reconnect.
    pub fn reset(&mut self) {
        self.inner.reset();
    }
}
