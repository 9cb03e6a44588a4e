//! Exponential reconnect backoff (spec §5 "on expiry the peer connection is
//! torn down and reconnected with exponential backoff").

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct BackoffParams {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffParams {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Tracks the "next attempt is allowed at" deadline for one peer
/// connection. `failed` doubles the wait (capped at `max`); `succeeded`
/// resets it.
#[derive(Debug, Clone)]
pub struct Backoff {
    params: BackoffParams,
    current: Duration,
    next_attempt_at: Option<Instant>,
}

impl Backoff {
    pub fn new(params: BackoffParams) -> Self {
        Self {
            current: params.initial,
            params,
            next_attempt_at: None,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.next_attempt_at {
            None => true,
            Some(deadline) => now >= deadline,
        }
    }

    pub fn failed(&mut self, now: Instant) {
        self.next_attempt_at = Some(now + self.current);
        let scaled = self.current.mul_f64(self.params.multiplier);
        self.current = scaled.min(self.params.max);
    }

    pub fn succeeded(&mut self) {
        self.current = self.params.initial;
        self.next_attempt_at = None;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let params = BackoffParams {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
            multiplier: 2.0,
        };
        let mut backoff = Backoff::new(params);
        let t0 = Instant::now();
        backoff.failed(t0);
        assert_eq!(backoff.current, Duration::from_millis(200));
        backoff.failed(t0);
        assert_eq!(backoff.current, Duration::from_millis(350));
        backoff.failed(t0);
        assert_eq!(backoff.current, Duration::from_millis(350));
    }

    #[test]
    fn succeeded_resets_to_initial() {
        let mut backoff = Backoff::default();
        backoff.failed(Instant::now());
        backoff.succeeded();
        assert_eq!(backoff.current, backoff.params.initial);
        assert!(backoff.ready(Instant::now()));
    }
}
