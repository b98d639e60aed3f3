// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blocking poll loop that waits for a remote resource to converge.
//!
//! A probe is called repeatedly until it reports [`PollOutcome::Reached`],
//! reports [`PollOutcome::Error`], or the wait policy's timeout elapses.
//! Probe errors are never retried.

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Result of a single probe evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T, E> {
    /// Not there yet. Carries a short description of the observed state.
    Pending(String),
    /// Target condition observed.
    Reached(T),
    /// The state could not be determined.
    Error(E),
}

/// Timing parameters for a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Overall budget, measured from the start of the wait (initial delay included).
    pub timeout: Duration,
    /// Sleep before the first probe.
    pub initial_delay: Duration,
    /// Lower bound on the time between two probes.
    pub min_poll_interval: Duration,
    /// Upper bound for the backoff between two probes.
    pub max_poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            initial_delay: Duration::from_secs(10),
            min_poll_interval: Duration::from_secs(3),
            max_poll_interval: Duration::from_secs(10),
        }
    }
}

impl WaitPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that probes back to back with no delay. Intended for tests.
    pub fn immediate(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_delay: Duration::ZERO,
            min_poll_interval: Duration::ZERO,
            max_poll_interval: Duration::ZERO,
        }
    }

    /// Set the overall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay before the first probe.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the minimum interval between probes.
    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// Set the maximum interval between probes.
    pub fn with_max_poll_interval(mut self, interval: Duration) -> Self {
        self.max_poll_interval = interval;
        self
    }

    /// Interval to sleep after `pending_probes` consecutive pending outcomes.
    ///
    /// Doubles from `min_poll_interval` up to `max_poll_interval`, and is never
    /// below `min_poll_interval`.
    pub fn poll_interval(&self, pending_probes: u32) -> Duration {
        let factor = 1u32 << pending_probes.saturating_sub(1).min(16);
        let backoff = self.min_poll_interval.saturating_mul(factor);
        backoff
            .min(self.max_poll_interval)
            .max(self.min_poll_interval)
    }
}

/// Failure of a [`wait_for`] call.
#[derive(Debug, Error)]
pub enum ConvergenceError<E> {
    /// The target was not reached within the policy's timeout.
    #[error(
        "timed out after {elapsed:?} waiting for {target} (still {pending}, last observed: {last_observed})"
    )]
    Timeout {
        pending: String,
        target: String,
        elapsed: Duration,
        last_observed: String,
    },

    /// The probe failed; the wait was abandoned.
    #[error("probe failed while waiting for {target}: {source}")]
    Probe {
        target: String,
        #[source]
        source: E,
    },
}

/// Labels describing what a wait is for; used in logs and errors only.
#[derive(Debug, Clone, Copy)]
pub struct WaitLabels<'a> {
    pub pending: &'a str,
    pub target: &'a str,
}

impl<'a> WaitLabels<'a> {
    pub fn new(pending: &'a str, target: &'a str) -> Self {
        Self { pending, target }
    }
}

/// Poll `probe` until it reaches its target.
///
/// Blocks the calling thread. The first probe runs after `policy.initial_delay`;
/// pending outcomes back off between `min_poll_interval` and `max_poll_interval`.
/// Consecutive probes are never closer than `min_poll_interval`: when the next
/// interval would end past the deadline the wait times out without probing again.
pub fn wait_for<T, E, F>(
    mut probe: F,
    labels: WaitLabels<'_>,
    policy: &WaitPolicy,
) -> Result<T, ConvergenceError<E>>
where
    F: FnMut() -> PollOutcome<T, E>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;

    if !policy.initial_delay.is_zero() {
        sleep_until_deadline(policy.initial_delay, deadline);
    }

    let mut pending_probes: u32 = 0;
    loop {
        let attempt = pending_probes + 1;
        debug!(attempt, wait_target = labels.target, "probing");

        match probe() {
            PollOutcome::Reached(observed) => {
                debug!(
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    wait_target = labels.target,
                    "target reached"
                );
                return Ok(observed);
            }
            PollOutcome::Error(source) => {
                return Err(ConvergenceError::Probe {
                    target: labels.target.to_string(),
                    source,
                });
            }
            PollOutcome::Pending(observed) => {
                pending_probes = pending_probes.saturating_add(1);

                let interval = policy.poll_interval(pending_probes);
                let now = Instant::now();
                let next_probe = now.checked_add(interval);
                if now >= deadline || next_probe.is_none_or(|next| next > deadline) {
                    let elapsed = now.duration_since(started);
                    warn!(
                        wait_target = labels.target,
                        observed = %observed,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "timed out waiting for target"
                    );
                    return Err(ConvergenceError::Timeout {
                        pending: labels.pending.to_string(),
                        target: labels.target.to_string(),
                        elapsed,
                        last_observed: observed,
                    });
                }

                debug!(observed = %observed, pending = labels.pending, "still pending");
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
        }
    }
}

fn sleep_until_deadline(interval: Duration, deadline: Instant) {
    let remaining = deadline.saturating_duration_since(Instant::now());
    let nap = interval.min(remaining);
    if !nap.is_zero() {
        thread::sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(600));
        assert_eq!(policy.initial_delay, Duration::from_secs(10));
        assert_eq!(policy.min_poll_interval, Duration::from_secs(3));
        assert_eq!(policy.max_poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_poll_interval_backoff() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.poll_interval(1), Duration::from_secs(3));
        assert_eq!(policy.poll_interval(2), Duration::from_secs(6));
        assert_eq!(policy.poll_interval(3), Duration::from_secs(10));
        assert_eq!(policy.poll_interval(40), Duration::from_secs(10));
    }

    #[test]
    fn test_poll_interval_never_below_minimum() {
        let policy = WaitPolicy::default()
            .with_min_poll_interval(Duration::from_secs(20))
            .with_max_poll_interval(Duration::from_secs(5));
        assert_eq!(policy.poll_interval(1), Duration::from_secs(20));
        assert_eq!(policy.poll_interval(4), Duration::from_secs(20));
    }

    #[test]
    fn test_immediate_policy_never_sleeps() {
        let policy = WaitPolicy::immediate(Duration::from_secs(1));
        assert_eq!(policy.poll_interval(1), Duration::ZERO);
        assert_eq!(policy.poll_interval(10), Duration::ZERO);
    }

    #[test]
    fn test_timeout_display() {
        let err: ConvergenceError<std::io::Error> = ConvergenceError::Timeout {
            pending: "pending".to_string(),
            target: "running".to_string(),
            elapsed: Duration::from_secs(2),
            last_observed: "STATE=1".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("timed out"));
        assert!(display.contains("running"));
        assert!(display.contains("STATE=1"));
    }
}
