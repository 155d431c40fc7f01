//! Retry policy with exponential backoff
//!
//! Decides, after each failed attempt, whether a fetch should try again and
//! how long it should wait first. The schedule is a pure function of the
//! attempt number so it can be tested without any clock.

use std::time::Duration;

use crate::upstream::RawOutcome;

/// Classification of a single attempt's failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// A retry may succeed
    Transient(String),
    /// No retry will succeed
    Permanent(String),
}

impl Failure {
    /// Human-readable reason reported by the upstream
    pub fn reason(&self) -> &str {
        match self {
            Failure::Transient(reason) | Failure::Permanent(reason) => reason,
        }
    }
}

/// Outcome of one attempt as seen by the retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<T> {
    Success(T),
    TransientFailure(String),
    PermanentFailure(String),
}

impl From<RawOutcome> for AttemptOutcome<crate::upstream::Payload> {
    fn from(raw: RawOutcome) -> Self {
        match raw {
            RawOutcome::Success(payload) => AttemptOutcome::Success(payload),
            RawOutcome::Recoverable(reason) => AttemptOutcome::TransientFailure(reason),
            RawOutcome::Unrecoverable(reason) => AttemptOutcome::PermanentFailure(reason),
        }
    }
}

/// Why the policy stopped retrying
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The last attempt failed transiently and no attempts remain
    RetriesExhausted { attempts: u32, last_reason: String },
    /// The attempt failed permanently
    Permanent(String),
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    Retry(Duration),
    /// Stop and surface the reason
    GiveUp(GiveUpReason),
}

/// Exponential backoff retry policy
///
/// The delay before attempt `n + 1` (after attempt `n` failed) is
/// `base_delay * multiplier^(n - 1)`, capped at `max_delay` when one is set.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` attempts in total
    ///
    /// `max_attempts` is clamped to at least 1 and a multiplier below 1 is
    /// treated as 1 (constant backoff).
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier,
            max_delay: None,
        }
    }

    /// Caps every delay at `max_delay`
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Total attempts allowed, the first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after `attempt` (1-based) has failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let nanos = self.base_delay.as_nanos() as f64 * factor;

        let cap = self.max_delay.unwrap_or(Duration::MAX);
        if !nanos.is_finite() || nanos >= cap.as_nanos() as f64 || nanos >= u64::MAX as f64 {
            return cap;
        }
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Whether another attempt is allowed after `attempt` failed transiently
    pub fn should_continue(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Decides what to do after `attempt` ended in `failure`
    pub fn decide(&self, attempt: u32, failure: Failure) -> RetryDecision {
        match failure {
            Failure::Permanent(reason) => RetryDecision::GiveUp(GiveUpReason::Permanent(reason)),
            Failure::Transient(reason) => {
                if self.should_continue(attempt) {
                    RetryDecision::Retry(self.delay_for(attempt))
                } else {
                    RetryDecision::GiveUp(GiveUpReason::RetriesExhausted {
                        attempts: attempt,
                        last_reason: reason,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(4, Duration::from_millis(100), 2.0)
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_respects_cap() {
        let policy = policy().with_max_delay(Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
        assert_eq!(policy.delay_for(60), Duration::from_millis(250));
    }

    #[test]
    fn test_uncapped_huge_attempt_saturates() {
        let policy = policy();
        assert_eq!(policy.delay_for(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_invalid_construction_is_clamped() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10), 0.5);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for(5), Duration::from_millis(10));
    }

    #[test]
    fn test_transient_failure_retries_until_exhausted() {
        let policy = policy();
        for attempt in 1..4 {
            assert_eq!(
                policy.decide(attempt, Failure::Transient("HTTP 503".to_string())),
                RetryDecision::Retry(policy.delay_for(attempt))
            );
        }
        assert_eq!(
            policy.decide(4, Failure::Transient("HTTP 503".to_string())),
            RetryDecision::GiveUp(GiveUpReason::RetriesExhausted {
                attempts: 4,
                last_reason: "HTTP 503".to_string(),
            })
        );
    }

    #[test]
    fn test_permanent_failure_gives_up_immediately() {
        let policy = policy();
        assert_eq!(
            policy.decide(1, Failure::Permanent("HTTP 400".to_string())),
            RetryDecision::GiveUp(GiveUpReason::Permanent("HTTP 400".to_string()))
        );
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1), 2.0);
        assert!(matches!(
            policy.decide(1, Failure::Transient("timeout".to_string())),
            RetryDecision::GiveUp(GiveUpReason::RetriesExhausted { attempts: 1, .. })
        ));
    }

    #[test]
    fn test_raw_outcome_conversion() {
        use crate::upstream::{Payload, RawOutcome};

        let ok: AttemptOutcome<Payload> = RawOutcome::Success(Payload::from("x")).into();
        assert_eq!(ok, AttemptOutcome::Success(Payload::from("x")));

        let transient: AttemptOutcome<Payload> = RawOutcome::Recoverable("429".to_string()).into();
        assert_eq!(transient, AttemptOutcome::TransientFailure("429".to_string()));

        let permanent: AttemptOutcome<Payload> =
            RawOutcome::Unrecoverable("bad symbol".to_string()).into();
        assert_eq!(permanent, AttemptOutcome::PermanentFailure("bad symbol".to_string()));
    }
}
