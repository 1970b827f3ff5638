//! Reconnect backoff schedule.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter for the reconnect loop.
///
/// The first attempt after a drop fires immediately; attempt `n > 1` waits
/// `min(base * 2^(n-2), max)` plus a uniform random slice of the configured
/// jitter. The counter resets on a successful connection.
#[derive(Debug)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    jitter: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max: Duration, jitter: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base,
            max,
            jitter,
            max_attempts,
            attempt: 0,
        }
    }

    /// Number of attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Advances to the next attempt and returns its delay, or `None` when
    /// the attempt cap is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts
            && self.attempt >= max
        {
            return None;
        }
        self.attempt += 1;

        if self.attempt == 1 {
            return Some(Duration::ZERO);
        }

        let exponent = (self.attempt - 2).min(31);
        let scaled = self.base.checked_mul(1u32 << exponent).unwrap_or(self.max);
        let capped = scaled.min(self.max);

        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::thread_rng().gen_range(Duration::ZERO..=self.jitter)
        };
        Some(capped + jitter)
    }

    /// Resets the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_doubles_from_the_second_attempt() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            Duration::ZERO,
            None,
        );
        let delays: Vec<_> = (0..4).map(|_| policy.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn delay_is_capped_at_max() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::ZERO,
            None,
        );
        for _ in 0..10 {
            assert!(policy.next_delay().unwrap() <= Duration::from_secs(5));
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_millis(250),
            None,
        );
        policy.next_delay();
        for _ in 0..20 {
            let delay = policy.next_delay().unwrap();
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn cap_exhaustion_stops_the_schedule() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            Duration::ZERO,
            Some(2),
        );
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut policy = ReconnectPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            Duration::ZERO,
            Some(1),
        );
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        policy.reset();
        assert_eq!(policy.next_delay(), Some(Duration::ZERO));
    }
}
