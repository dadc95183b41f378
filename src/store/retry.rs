//! Bounded retry with a fixed delay between attempts

use log::warn;
use std::fmt::Display;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 10;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Pause between two consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Successful result and the attempt that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Every attempt failed
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds or the attempt budget runs out.
///
/// `op` receives the 1-based attempt number. `sleep` is called with the
/// policy delay between attempts, never after the final one. A policy
/// with zero attempts still runs the operation once.
pub fn retry<T, E, F, S>(policy: &RetryPolicy, mut op: F, mut sleep: S) -> Result<Retried<T>, Exhausted<E>>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
    S: FnMut(Duration),
{
    let budget = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                })
            }
            Err(e) => {
                let left = budget - attempt;
                if left == 0 {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                warn!("Failed, {} retries left: {}", left, e);
                sleep(policy.delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(7),
        }
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let mut sleeps = Vec::new();
        let result = retry(&policy(10), |_| Ok::<_, String>(42), |d| sleeps.push(d)).unwrap();
        assert_eq!(result.value, 42);
        assert_eq!(result.attempts, 1);
        assert!(sleeps.is_empty());
    }

    #[test]
    fn test_succeeds_after_failures() {
        let mut sleeps = Vec::new();
        let result = retry(
            &policy(10),
            |attempt| if attempt <= 3 { Err("down") } else { Ok(attempt) },
            |d| sleeps.push(d),
        )
        .unwrap();
        assert_eq!(result.attempts, 4);
        assert_eq!(result.value, 4);
        assert_eq!(sleeps, vec![Duration::from_millis(7); 3]);
    }

    #[test]
    fn test_exhausts_budget() {
        let mut calls = 0;
        let mut sleeps = 0;
        let err = retry(
            &policy(10),
            |_| {
                calls += 1;
                Err::<(), _>(format!("failure {}", calls))
            },
            |_| sleeps += 1,
        )
        .unwrap_err();
        assert_eq!(calls, 10);
        assert_eq!(sleeps, 9);
        assert_eq!(err.attempts, 10);
        assert_eq!(err.last_error, "failure 10");
    }

    #[test]
    fn test_zero_attempts_runs_once() {
        let mut calls = 0;
        let err = retry(
            &policy(0),
            |_| {
                calls += 1;
                Err::<(), _>("nope")
            },
            |_| panic!("must not sleep"),
        )
        .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 10);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }
}
