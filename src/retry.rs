//! Backoff configuration with jitter, reused from the template's retry
//! module as the building block for the producer worker's bounded respawn
//! backoff (see `producer::lifecycle`). Not wired into the fixed-interval
//! background loops — §4.5/§4.9 specify exact fixed sleep durations for
//! those, not exponential backoff.

use rand::Rng;
use std::time::Duration;

/// Retry/backoff configuration.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
    pub jitter: JitterMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            max_retries: 8,
            jitter: JitterMode::Full,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate the next backoff delay with jitter.
    pub fn next_backoff(&self, attempt: u32, current_delay: Duration) -> Duration {
        let base_delay = if attempt == 0 {
            self.initial_backoff
        } else {
            let multiplied = current_delay.as_secs_f64() * self.multiplier;
            Duration::from_secs_f64(multiplied.min(self.max_backoff.as_secs_f64()))
        };

        apply_jitter(base_delay, &self.jitter)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Jitter mode for retry backoff (AWS SDK-style).
#[derive(Clone, Debug, Default)]
pub enum JitterMode {
    None,
    #[default]
    Full,
    Equal,
    Decorrelated,
}

/// Apply jitter to a backoff delay.
pub fn apply_jitter(delay: Duration, mode: &JitterMode) -> Duration {
    let mut rng = rand::thread_rng();

    match mode {
        JitterMode::None => delay,
        JitterMode::Full => Duration::from_secs_f64(rng.gen::<f64>() * delay.as_secs_f64()),
        JitterMode::Equal => {
            let half = delay.as_secs_f64() / 2.0;
            Duration::from_secs_f64(half + rng.gen::<f64>() * half)
        }
        JitterMode::Decorrelated => {
            let base = delay.as_secs_f64() / 3.0;
            let upper = delay.as_secs_f64() * 3.0;
            Duration::from_secs_f64(base + rng.gen::<f64>() * (upper - base))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_retry_respects_max_retries() {
        let config = RetryConfig {
            max_retries: 3,
            ..RetryConfig::default()
        };
        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
    }

    #[test]
    fn none_jitter_is_a_no_op() {
        let delay = Duration::from_millis(100);
        assert_eq!(apply_jitter(delay, &JitterMode::None), delay);
    }

    #[test]
    fn full_jitter_never_exceeds_the_base_delay() {
        let delay = Duration::from_millis(200);
        for _ in 0..50 {
            assert!(apply_jitter(delay, &JitterMode::Full) <= delay);
        }
    }

    #[test]
    fn next_backoff_caps_at_max_backoff() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 10.0,
            jitter: JitterMode::None,
            max_retries: 8,
        };
        let mut delay = config.initial_backoff;
        for attempt in 0..5 {
            delay = config.next_backoff(attempt, delay);
            assert!(delay <= config.max_backoff);
        }
    }
}
