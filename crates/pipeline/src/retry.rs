//! Retry decisions and backoff computation.
//!
//! The engine asks [`next_attempt`] after every attempt. The answer depends
//! only on the policy, the attempt index, and the classified outcome, so the
//! blocking and suspending entry points share it unchanged.

use std::time::Duration;

use rand::Rng;

use crate::{CallError, Outcome, RetryPolicy};

/// What the engine does after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Wait `after`, then perform another attempt.
    Retry {
        /// Jittered backoff delay.
        after: Duration,
    },
    /// The attempt succeeded; stop.
    StopSuccess,
    /// Stop and surface this error.
    StopFailure(CallError),
}

/// Decides what follows attempt number `attempt` (1-based).
///
/// - Success stops immediately, whatever budget remains.
/// - A transient failure the policy accepts is retried while
///   `attempt < max_attempts`; on the last attempt it is surfaced as
///   [`CallError::RetryExhausted`].
/// - Any other failure is surfaced as itself.
pub fn next_attempt(policy: &RetryPolicy, attempt: u32, outcome: &Outcome) -> Decision {
    let failure = match outcome {
        Outcome::Success(_) => return Decision::StopSuccess,
        Outcome::Failure(f) => f,
    };

    if !failure.transient || !policy.is_retryable(failure.kind) {
        return Decision::StopFailure(failure.clone().into_error());
    }

    if attempt >= policy.max_attempts() {
        return Decision::StopFailure(CallError::RetryExhausted {
            attempts: attempt,
            last: Box::new(failure.clone().into_error()),
        });
    }

    Decision::Retry { after: backoff_delay(policy, attempt) }
}

/// Un-jittered delay after failed attempt `attempt`:
/// `min(base_delay * 2^(attempt-1), max_delay)`.
pub fn backoff_ceiling(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63);
    let factor = 1u64 << exponent;
    let factor = u32::try_from(factor).unwrap_or(u32::MAX);
    policy
        .base_delay()
        .checked_mul(factor)
        .map_or(policy.max_delay(), |d| d.min(policy.max_delay()))
}

/// Scales `ceiling` by a jitter multiplier chosen by `unit` in `[0, 1]`:
/// `0` maps to `1 - jitter_fraction`, `1` to `1 + jitter_fraction`.
///
/// Saturates at [`Duration::MAX`].
pub fn apply_jitter(ceiling: Duration, jitter_fraction: f64, unit: f64) -> Duration {
    let unit = unit.clamp(0.0, 1.0);
    let multiplier = 1.0 - jitter_fraction + 2.0 * jitter_fraction * unit;
    Duration::try_from_secs_f64((ceiling.as_secs_f64() * multiplier).max(0.0)).unwrap_or(Duration::MAX)
}

/// Jittered delay before attempt `attempt + 1`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let ceiling = backoff_ceiling(policy, attempt);
    if policy.jitter_fraction() == 0.0 || ceiling.is_zero() {
        return ceiling;
    }
    let unit: f64 = rand::rng().random_range(0.0..=1.0);
    apply_jitter(ceiling, policy.jitter_fraction(), unit)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{ErrorKind, Failure, Payload};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(100), Duration::from_secs(1), 0.0).unwrap()
    }

    fn transient() -> Outcome {
        Outcome::Failure(Failure::transient(ErrorKind::Transient, "busy", Some(503)))
    }

    #[test]
    fn success_stops_regardless_of_budget() {
        let ok = Outcome::Success(Payload::Bytes(Bytes::new()));
        assert_eq!(next_attempt(&policy(5), 1, &ok), Decision::StopSuccess);
    }

    #[test]
    fn transient_failure_is_retried_until_budget_is_spent() {
        let p = policy(3);
        assert_eq!(next_attempt(&p, 1, &transient()), Decision::Retry { after: Duration::from_millis(100) });
        assert_eq!(next_attempt(&p, 2, &transient()), Decision::Retry { after: Duration::from_millis(200) });

        match next_attempt(&p, 3, &transient()) {
            Decision::StopFailure(CallError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last.kind(), ErrorKind::Transient);
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn permanent_failure_surfaces_as_itself() {
        let outcome = Outcome::Failure(Failure::permanent(ErrorKind::Protocol, "bad", Some(400)));
        match next_attempt(&policy(5), 1, &outcome) {
            Decision::StopFailure(err) => {
                assert_eq!(err.kind(), ErrorKind::Protocol);
                assert_eq!(err.status(), Some(400));
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn predicate_rejection_surfaces_failure_kind() {
        let p = policy(5).with_retryable(|k| k == ErrorKind::Timeout);
        match next_attempt(&p, 1, &transient()) {
            Decision::StopFailure(err) => assert_eq!(err.kind(), ErrorKind::Transient),
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn single_attempt_policy_exhausts_immediately() {
        match next_attempt(&policy(1), 1, &transient()) {
            Decision::StopFailure(err) => {
                assert_eq!(err.kind(), ErrorKind::RetryExhausted);
                assert_eq!(err.attempts(), Some(1));
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn ceiling_doubles_and_caps() {
        let p = policy(10);
        let ceilings: Vec<_> = (1..=6).map(|k| backoff_ceiling(&p, k).as_millis()).collect();
        assert_eq!(ceilings, [100, 200, 400, 800, 1000, 1000]);
        assert_eq!(backoff_ceiling(&p, u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn jitter_endpoints() {
        let c = Duration::from_millis(1000);
        assert_eq!(apply_jitter(c, 0.5, 0.0), Duration::from_millis(500));
        assert_eq!(apply_jitter(c, 0.5, 1.0), Duration::from_millis(1500));
        assert_eq!(apply_jitter(c, 1.0, 0.0), Duration::ZERO);
    }

    #[test]
    fn jitter_saturates_at_the_largest_duration() {
        assert_eq!(apply_jitter(Duration::MAX, 1.0, 1.0), Duration::MAX);
        assert_eq!(apply_jitter(Duration::MAX, 0.5, 1.0), Duration::MAX);

        let p = RetryPolicy::new(3, Duration::MAX, Duration::MAX, 1.0).unwrap();
        for _ in 0..64 {
            assert!(backoff_delay(&p, 1).as_secs_f64().is_finite());
        }
        assert!(matches!(next_attempt(&p, 1, &transient()), Decision::Retry { .. }));
    }
}
