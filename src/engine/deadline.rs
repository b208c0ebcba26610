//! Receive deadline management and adaptive poll backoff

use std::time::{Duration, Instant};

/// How a receive deadline reacts to forward progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlinePolicy {
    /// Deadline is pushed forward every time a read returns bytes
    Sliding,
    /// Deadline is computed once at call start and never extended
    Fixed,
}

/// Wall-clock deadline for one receive operation.
#[derive(Debug)]
pub struct Deadline {
    end: Instant,
    timeout: Duration,
    policy: DeadlinePolicy,
}

impl Deadline {
    pub fn new(timeout: Duration, policy: DeadlinePolicy) -> Self {
        Self {
            end: Instant::now() + timeout,
            timeout,
            policy,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.end
    }

    pub fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    /// Record forward progress. Under [`DeadlinePolicy::Sliding`] the
    /// deadline becomes `now + timeout`; under `Fixed` this is a no-op.
    pub fn progress(&mut self) {
        if self.policy == DeadlinePolicy::Sliding {
            self.end = Instant::now() + self.timeout;
        }
    }
}

/// Adaptive sleep for polls that found the queue empty.
///
/// Starts small and doubles, but a single nap never exceeds the remaining
/// deadline budget and the doubling stops at half of it, so the loop wakes
/// in time to observe expiry rather than overshooting it.
#[derive(Debug)]
pub struct PollBackoff {
    current: Duration,
}

impl PollBackoff {
    const INITIAL: Duration = Duration::from_millis(1);

    pub fn new() -> Self {
        Self {
            current: Self::INITIAL,
        }
    }

    /// Next nap length given the remaining budget. Advances internal state.
    pub fn next_delay(&mut self, remaining: Duration) -> Duration {
        let nap = self.current.min(remaining);
        let doubled = self.current.saturating_mul(2);
        if doubled <= remaining / 2 {
            self.current = doubled;
        }
        nap
    }

    /// Sleep for the next delay, if any budget remains.
    pub fn sleep(&mut self, remaining: Duration) {
        let nap = self.next_delay(remaining);
        if !nap.is_zero() {
            std::thread::sleep(nap);
        }
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_deadline_ignores_progress() {
        let mut d = Deadline::new(Duration::from_millis(20), DeadlinePolicy::Fixed);
        let before = d.remaining();
        std::thread::sleep(Duration::from_millis(5));
        d.progress();
        assert!(d.remaining() < before);
    }

    #[test]
    fn sliding_deadline_extends_on_progress() {
        let mut d = Deadline::new(Duration::from_millis(20), DeadlinePolicy::Sliding);
        std::thread::sleep(Duration::from_millis(10));
        d.progress();
        // Back to (almost) the full budget
        assert!(d.remaining() > Duration::from_millis(15));
    }

    #[test]
    fn deadline_expires() {
        let d = Deadline::new(Duration::from_millis(1), DeadlinePolicy::Fixed);
        std::thread::sleep(Duration::from_millis(3));
        assert!(d.expired());
        assert_eq!(d.remaining(), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_up_to_half_the_budget() {
        let mut b = PollBackoff::new();
        let budget = Duration::from_millis(100);
        assert_eq!(b.next_delay(budget), Duration::from_millis(1));
        assert_eq!(b.next_delay(budget), Duration::from_millis(2));
        assert_eq!(b.next_delay(budget), Duration::from_millis(4));
        assert_eq!(b.next_delay(budget), Duration::from_millis(8));
        assert_eq!(b.next_delay(budget), Duration::from_millis(16));
        assert_eq!(b.next_delay(budget), Duration::from_millis(32));
        // 64 > 100/2, doubling stops
        assert_eq!(b.next_delay(budget), Duration::from_millis(32));
    }

    #[test]
    fn nap_never_exceeds_remaining() {
        let mut b = PollBackoff::new();
        let budget = Duration::from_millis(100);
        for _ in 0..6 {
            b.next_delay(budget);
        }
        assert_eq!(
            b.next_delay(Duration::from_millis(3)),
            Duration::from_millis(3)
        );
        assert_eq!(b.next_delay(Duration::ZERO), Duration::ZERO);
    }
}
