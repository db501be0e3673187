// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry and request pacing.
//!
//! The sleeping itself goes through [`Sleeper`] so that tests can run the
//! collector with zero-delay, recorded pauses.

use async_trait::async_trait;
use rand::Rng;
use std::{future::Future, time::Duration};

/// How many times an operation is attempted, and how long to wait between
/// failed attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(60),
        }
    }
}

/// Something that can wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the Tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// The last error of an operation that failed on every attempt.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// Waits `policy.backoff` after each failed attempt except the last one. A
/// policy with `max_attempts == 0` still makes one attempt.
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= max_attempts {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                log::warn!(
                    "  attempt {attempt}/{max_attempts} failed: {error}; retrying in {:?}",
                    policy.backoff
                );
                sleeper.sleep(policy.backoff).await;
                attempt += 1;
            }
        }
    }
}

/// A randomized pause between requests, uniformly distributed in `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolitenessDelay {
    pub min: Duration,
    pub max: Duration,
}

impl PolitenessDelay {
    pub const NONE: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records requested pauses without waiting.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub(crate) fn slept(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSleeper;
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let sleeper = RecordingSleeper::default();
        let result: Result<u32, Exhausted<String>> =
            execute_with_retry(policy(2), &sleeper, |attempt| async move { Ok(attempt) }).await;

        assert_eq!(result.unwrap(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let sleeper = RecordingSleeper::default();
        let result = execute_with_retry(policy(3), &sleeper, |attempt| async move {
            if attempt < 3 {
                Err(format!("blocked on attempt {attempt}"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(60); 2]);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let sleeper = RecordingSleeper::default();
        let result: Result<(), _> = execute_with_retry(policy(2), &sleeper, |attempt| async move {
            Err(format!("failure {attempt}"))
        })
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.last_error, "failure 2");
        // No backoff after the final attempt.
        assert_eq!(sleeper.slept(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let sleeper = RecordingSleeper::default();
        let result: Result<(), _> =
            execute_with_retry(policy(0), &sleeper, |_| async { Err("nope") }).await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert!(sleeper.slept().is_empty());
    }

    #[test]
    fn test_politeness_sample_in_range() {
        let delay = PolitenessDelay {
            min: Duration::from_secs(45),
            max: Duration::from_secs(90),
        };
        for _ in 0..100 {
            let d = delay.sample();
            assert!(d >= delay.min && d <= delay.max, "{d:?} out of range");
        }

        assert_eq!(PolitenessDelay::NONE.sample(), Duration::ZERO);
    }
}
