//! Back-off as a value, not a function (design note in SPEC_FULL.md §9).
//!
//! A single [`Backoff`] value and its [`Backoff::steps`] stepper are shared
//! by optimistic-concurrency retry, per-key lock acquisition, and the
//! Allocation error-retry loop, so the three only ever differ in the
//! numbers they're constructed with.

use rand::Rng;
use std::time::Duration;

/// An exponential back-off schedule: `initial * factor^n`, capped, with
/// multiplicative jitter, for at most `max_steps` steps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub cap: Duration,
    pub max_steps: usize,
}

impl Backoff {
    /// Default lock-acquisition back-off: 10 steps, 100ms initial, x2, 0.1 jitter.
    pub const LOCK_ACQUISITION: Backoff = Backoff {
        initial: Duration::from_millis(100),
        factor: 2.0,
        jitter: 0.1,
        cap: Duration::from_secs(10),
        max_steps: 10,
    };

    /// Default optimistic-concurrency retry back-off for Allocation writes.
    pub const OPTIMISTIC_CONCURRENCY: Backoff = Backoff {
        initial: Duration::from_millis(100),
        factor: 2.0,
        jitter: 0.1,
        cap: Duration::from_secs(5),
        max_steps: 5,
    };

    /// The ~2-day Error-state retry loop. 552 steps is a magic number
    /// carried over from the source system; kept as a named constant and
    /// overridable via `PLENUSLB_ERROR_RETRY_MAX_STEPS` (see
    /// `shared::os::env_var`).
    pub const ERROR_RETRY: Backoff = Backoff {
        initial: Duration::from_secs(1),
        factor: 1.2,
        jitter: 0.2,
        cap: Duration::from_secs(5 * 60),
        max_steps: 552,
    };

    /// Node-picking retry while waiting for a ready host-interface agent.
    pub const NODE_PICK: Backoff = Backoff {
        initial: Duration::from_millis(200),
        factor: 1.5,
        jitter: 0.1,
        cap: Duration::from_secs(30),
        max_steps: 60,
    };

    /// Delay for retry attempt `step` (0-indexed), with jitter applied.
    pub fn delay_for_step(&self, step: usize) -> Duration {
        let exp = self.factor.powi(step.min(1_000) as i32);
        let unjittered = self.initial.mul_f64(exp).min(self.cap);
        if self.jitter <= 0.0 {
            return unjittered;
        }
        // Jitter in [1 - jitter, 1 + jitter], symmetric around the unjittered value,
        // then re-capped so jitter never pushes the delay past the configured ceiling.
        let factor = 1.0 + self.jitter * rand::thread_rng().gen_range(-1.0..=1.0);
        Duration::from_secs_f64(unjittered.as_secs_f64() * factor.max(0.0)).min(self.cap)
    }

    /// An iterator over `(step_index, delay)` up to `max_steps`, used by
    /// callers that want `for (step, delay) in backoff.steps() { ... }`.
    pub fn steps(&self) -> impl Iterator<Item = (usize, Duration)> + '_ {
        (0..self.max_steps).map(move |step| (step, self.delay_for_step(step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        let b = Backoff::ERROR_RETRY;
        for step in [0, 1, 10, 100, 551] {
            assert!(b.delay_for_step(step) <= b.cap + Duration::from_millis(1));
        }
    }

    #[test]
    fn delay_grows_with_step_before_cap() {
        let b = Backoff::LOCK_ACQUISITION;
        // Compare the unjittered midpoints indirectly: average over many
        // samples should trend upward for early steps.
        let avg = |step: usize| -> f64 {
            let n = 200;
            let sum: f64 = (0..n).map(|_| b.delay_for_step(step).as_secs_f64()).sum();
            sum / n as f64
        };
        assert!(avg(0) < avg(3));
    }

    #[test]
    fn steps_len_matches_max_steps() {
        let b = Backoff::LOCK_ACQUISITION;
        assert_eq!(b.steps().count(), b.max_steps);
    }

    #[test]
    fn error_retry_budget_is_about_two_days() {
        // Sum of capped delays (ignoring jitter) should be in the right
        // order of magnitude for the documented "~2 days" total budget.
        let b = Backoff::ERROR_RETRY;
        let total: Duration = (0..b.max_steps)
            .map(|s| b.initial.mul_f64(b.factor.powi(s as i32)).min(b.cap))
            .sum();
        assert!(total.as_secs() > 60 * 60 * 24); // > 1 day
    }
}
