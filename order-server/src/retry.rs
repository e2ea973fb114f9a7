//! Retry with exponential backoff
//!
//! Policy-driven retry loop used by the ingest pipeline for transient
//! store failures. Waits are cancellable: a shutdown signal preempts any
//! pending sleep and surfaces as [`RetryError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Exponential backoff with a cap and optional uniform jitter.
///
/// For attempt `n` (0-based) the target delay is `min(base * 2^n, cap)`.
/// A zero base disables waiting entirely; a zero cap means unbounded.
/// With jitter enabled the actual delay is drawn uniformly from
/// `[0, target]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: bool) -> Self {
        let base = if !cap.is_zero() && base > cap { cap } else { base };
        Self { base, cap, jitter }
    }

    /// Delay before retrying after the given 0-based attempt.
    pub fn wait(&self, attempt: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }

        let mut wait = self.base;
        for _ in 0..attempt {
            match wait.checked_mul(2) {
                Some(doubled) => wait = doubled,
                None => {
                    wait = Duration::MAX;
                    break;
                }
            }
            if !self.cap.is_zero() && wait >= self.cap {
                wait = self.cap;
                break;
            }
        }
        if !self.cap.is_zero() && wait > self.cap {
            wait = self.cap;
        }

        if !self.jitter || wait.is_zero() {
            return wait;
        }
        let nanos = wait.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
    }
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone)]
pub struct Policy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

/// Why the retried operation ultimately did not succeed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The shutdown token fired before or during a wait.
    Cancelled,
    /// The operation failed terminally or exhausted its attempts.
    Failed(E),
}

/// Run `op` up to `max_retries + 1` times.
///
/// `should_retry` decides whether an error is worth another attempt;
/// a `false` returns immediately. `on_retry(err, attempt, wait)` fires
/// before each sleep with the 1-based attempt number.
pub async fn run<T, E, Op, Fut>(
    shutdown: &CancellationToken,
    policy: &Policy,
    should_retry: impl Fn(&E) -> bool,
    mut op: Op,
    mut on_retry: impl FnMut(&E, u32, Duration),
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    for attempt in 0..=policy.max_retries {
        if shutdown.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if shutdown.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        if !should_retry(&err) || attempt == policy.max_retries {
            return Err(RetryError::Failed(err));
        }

        let wait = policy.backoff.wait(attempt);
        on_retry(&err, attempt + 1, wait);
        if !wait.is_zero() {
            tokio::select! {
                _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
    unreachable!("loop returns on success, terminal error, or exhaustion")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let b = Backoff::new(millis(100), millis(500), false);
        assert_eq!(b.wait(0), millis(100));
        assert_eq!(b.wait(1), millis(200));
        assert_eq!(b.wait(2), millis(400));
        assert_eq!(b.wait(3), millis(500));
        assert_eq!(b.wait(10), millis(500));
    }

    #[test]
    fn backoff_zero_base_disables_waiting() {
        let b = Backoff::new(Duration::ZERO, millis(500), true);
        assert_eq!(b.wait(0), Duration::ZERO);
        assert_eq!(b.wait(5), Duration::ZERO);
    }

    #[test]
    fn backoff_without_cap_keeps_doubling() {
        let b = Backoff::new(millis(100), Duration::ZERO, false);
        assert_eq!(b.wait(4), millis(1600));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let b = Backoff::new(Duration::from_secs(u64::MAX / 2), Duration::ZERO, false);
        // One more doubling would overflow; the wait saturates.
        assert_eq!(b.wait(64), Duration::MAX);
    }

    #[test]
    fn backoff_base_is_clamped_to_cap() {
        let b = Backoff::new(millis(900), millis(300), false);
        assert_eq!(b.wait(0), millis(300));
    }

    #[test]
    fn jitter_stays_within_target() {
        let b = Backoff::new(millis(100), millis(500), true);
        for attempt in 0..4 {
            let target = Backoff::new(millis(100), millis(500), false).wait(attempt);
            for _ in 0..50 {
                assert!(b.wait(attempt) <= target);
            }
        }
    }

    fn policy(max_retries: u32) -> Policy {
        Policy {
            max_retries,
            backoff: Backoff::new(millis(1), millis(5), false),
        }
    }

    #[tokio::test]
    async fn succeeds_without_retrying() {
        let shutdown = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<u32, RetryError<&str>> = run(
            &shutdown,
            &policy(3),
            |_| true,
            || {
                calls2.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
            |_, _, _| panic!("on_retry must not fire on success"),
        )
        .await;

        assert!(matches!(result, Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let shutdown = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let mut retries: Vec<(u32, Duration)> = Vec::new();

        let result: Result<&str, RetryError<&str>> = run(
            &shutdown,
            &policy(5),
            |_| true,
            || {
                let n = calls2.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok("done")
                    }
                }
            },
            |_, attempt, wait| retries.push((attempt, wait)),
        )
        .await;

        assert!(matches!(result, Ok("done")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two retries, 1-based attempts, non-decreasing waits under the cap.
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[0].0, 1);
        assert_eq!(retries[1].0, 2);
        assert!(retries[0].1 <= retries[1].1);
    }

    #[tokio::test]
    async fn terminal_error_returns_immediately() {
        let shutdown = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<(), RetryError<&str>> = run(
            &shutdown,
            &policy(5),
            |err| *err != "terminal",
            || {
                calls2.fetch_add(1, Ordering::SeqCst);
                async { Err("terminal") }
            },
            |_, _, _| panic!("terminal errors are not retried"),
        )
        .await;

        assert!(matches!(result, Err(RetryError::Failed("terminal"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let shutdown = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let result: Result<(), RetryError<&str>> = run(
            &shutdown,
            &policy(2),
            |_| true,
            || {
                calls2.fetch_add(1, Ordering::SeqCst);
                async { Err("still failing") }
            },
            |_, _, _| {},
        )
        .await;

        assert!(matches!(result, Err(RetryError::Failed("still failing"))));
        // max_retries = 2 means three attempts in total.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_preempts_the_sleep() {
        let shutdown = CancellationToken::new();
        let slow_policy = Policy {
            max_retries: 3,
            backoff: Backoff::new(Duration::from_secs(60), Duration::ZERO, false),
        };

        let token = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(millis(20)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let result: Result<(), RetryError<&str>> = run(
            &shutdown,
            &slow_policy,
            |_| true,
            || async { Err("transient") },
            |_, _, _| {},
        )
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        // Nowhere near the 60s backoff.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result: Result<(), RetryError<&str>> = run(
            &shutdown,
            &policy(3),
            |_| true,
            || async { panic!("op must not run after cancellation") },
            |_, _, _| {},
        )
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
    }
}
