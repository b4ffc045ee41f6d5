//! Exponential backoff between worker launch attempts

use std::time::Duration;

use rand::Rng;

use convoy_config::SupervisorConfig;

/// Delay policy for retrying a failed launch: exponential growth from an
/// initial delay, capped at a maximum, optionally jittered so workers that
/// fail together do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct StartBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl StartBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: bool) -> Self {
        Self {
            initial,
            max,
            multiplier,
            jitter,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(
            config.start_initial_backoff,
            config.start_max_backoff,
            config.start_backoff_multiplier,
            config.start_jitter,
        )
    }

    /// Delay to wait after the given failed attempt (1-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max.as_millis() as f64);
        let delay = Duration::from_millis(capped as u64);
        if self.jitter {
            Self::jittered(delay)
        } else {
            delay
        }
    }

    /// Scale the delay by a random factor in [0.8, 1.2)
    fn jittered(delay: Duration) -> Duration {
        let factor = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> StartBackoff {
        StartBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 2.0, false)
    }

    #[test]
    fn delays_grow_exponentially() {
        let backoff = backoff();
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped_at_the_maximum() {
        let backoff = backoff();
        assert_eq!(backoff.delay_for(6), Duration::from_secs(30));
        assert_eq!(backoff.delay_for(20), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let backoff = StartBackoff::new(Duration::from_secs(10), Duration::from_secs(60), 2.0, true);
        for _ in 0..50 {
            let delay = backoff.delay_for(1);
            assert!(delay >= Duration::from_secs(8), "delay {delay:?} below jitter floor");
            assert!(delay <= Duration::from_secs(12), "delay {delay:?} above jitter ceiling");
        }
    }

    #[test]
    fn from_config_uses_supervisor_settings() {
        let config = SupervisorConfig {
            start_jitter: false,
            ..SupervisorConfig::default()
        };
        let backoff = StartBackoff::from_config(&config);
        assert_eq!(backoff.delay_for(1), config.start_initial_backoff);
        assert_eq!(backoff.delay_for(2), config.start_initial_backoff * 2);
    }
}
