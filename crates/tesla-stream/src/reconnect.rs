//! Reconnection backoff policy
//!
//! Exponential backoff with multiplicative jitter, owned exclusively by one
//! vehicle session. `next_delay` must be called exactly once per failed
//! connect/subscribe/stream cycle and `reset` exactly once per successful
//! subscription; double-counting corrupts the backoff growth.

use rand::Rng;
use std::time::Duration;

use crate::config::ReconnectConfig;

/// Stateful backoff calculator for one vehicle session
#[derive(Debug)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy from reconnect configuration
    pub fn new(config: &ReconnectConfig) -> Self {
        ReconnectPolicy {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter,
            attempts: 0,
        }
    }

    /// Number of failed cycles since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reset the attempt counter on successful subscription
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Compute the delay before the next reconnect attempt
    ///
    /// Doubles per attempt up to the maximum, with uniform jitter of
    /// ±`jitter` of the nominal delay, clamped to never fall below the
    /// base delay.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let nominal = self.nominal_delay(self.attempts);

        let jitter_range = nominal * self.jitter;
        let jittered = nominal + rand::thread_rng().gen_range(-jitter_range..=jitter_range);

        Duration::from_secs_f64(jittered.max(self.base_delay.as_secs_f64()))
    }

    // Jitter-free delay envelope for attempt n >= 1
    fn nominal_delay(&self, attempt: u32) -> f64 {
        let base = self.base_delay.as_secs_f64();
        let doubled = base * 2f64.powi(attempt.saturating_sub(1) as i32);
        doubled.min(self.max_delay.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, max: u64, jitter: f64) -> ReconnectPolicy {
        ReconnectPolicy::new(&ReconnectConfig {
            base_delay: Duration::from_secs(base),
            max_delay: Duration::from_secs(max),
            jitter,
        })
    }

    #[test]
    fn test_nominal_envelope() {
        let policy = policy(5, 300, 0.0);
        let expected = [5.0, 10.0, 20.0, 40.0, 80.0, 160.0, 300.0, 300.0];
        for (attempt, want) in expected.iter().enumerate() {
            assert_eq!(policy.nominal_delay(attempt as u32 + 1), *want);
        }
    }

    #[test]
    fn test_attempts_increment_per_call() {
        let mut policy = policy(5, 300, 0.1);
        assert_eq!(policy.attempts(), 0);
        policy.next_delay();
        assert_eq!(policy.attempts(), 1);
        policy.next_delay();
        assert_eq!(policy.attempts(), 2);
    }

    #[test]
    fn test_delay_never_below_base() {
        let mut policy = policy(5, 300, 0.5);
        for _ in 0..20 {
            assert!(policy.next_delay() >= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_jittered_envelope_monotone_bounds() {
        // Without reset, the jittered delay must stay within ±jitter of a
        // non-decreasing nominal envelope.
        let mut policy = policy(5, 300, 0.1);
        let mut last_nominal = 0.0;
        for attempt in 1..=10u32 {
            let delay = policy.next_delay().as_secs_f64();
            let nominal = policy.nominal_delay(attempt);
            assert!(nominal >= last_nominal);
            assert!(delay >= (nominal * 0.9).max(5.0) - 1e-9);
            assert!(delay <= nominal * 1.1 + 1e-9);
            last_nominal = nominal;
        }
    }

    #[test]
    fn test_reset_returns_to_base_envelope() {
        let mut policy = policy(5, 300, 0.0);
        for _ in 0..5 {
            policy.next_delay();
        }
        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay(), Duration::from_secs(5));
    }
}
