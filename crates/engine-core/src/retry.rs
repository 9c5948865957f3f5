use std::{fmt::Display, future::Future, time::Duration};
use tracing::warn;

const DEFAULT_ATTEMPTS: usize = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Doublings stop here; later attempts wait `max_delay` anyway.
const MAX_DOUBLINGS: u32 = 16;

/// What a classifier decides about a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Classified as permanent on the attempt that produced it.
    Fatal(E),
    /// Every attempt failed transiently; `last` is the final failure.
    AttemptsExceeded { attempts: usize, last: E },
}

impl<E> RetryError<E> {
    /// The underlying error, whichever way the policy gave up.
    pub fn into_inner(self) -> E {
        match self {
            Self::Fatal(err) | Self::AttemptsExceeded { last: err, .. } => err,
        }
    }
}

/// Attempt budget plus capped exponential backoff between attempts.
///
/// Readers and writers opt in with an explicit policy; nothing in the engine
/// retries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl RetryPolicy {
    /// At least one attempt is always made. A zero `max_delay` means the
    /// delay never grows past `base_delay`.
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() { base_delay } else { max_delay },
        }
    }

    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Awaits `op` again after each failure `classify` marks as
    /// [`RetryDisposition::Retry`], sleeping between attempts. `what` labels
    /// the operation in the retry warnings.
    pub async fn run<F, Fut, T, E, C>(
        &self,
        what: &str,
        mut op: F,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDisposition,
        E: Display,
    {
        let mut failures = 0usize;
        let last = loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if classify(&err) == RetryDisposition::Stop {
                return Err(RetryError::Fatal(err));
            }
            failures += 1;
            if failures >= self.max_attempts {
                break err;
            }

            let pause = self.backoff_delay(failures - 1);
            warn!(
                operation = what,
                attempt = failures,
                max_attempts = self.max_attempts,
                delay_ms = pause.as_millis() as u64,
                error = %err,
                "Transient failure, trying again"
            );
            tokio::time::sleep(pause).await;
        };

        Err(RetryError::AttemptsExceeded {
            attempts: failures,
            last,
        })
    }

    /// Wait before the retry that follows failed attempt `attempt` (0-based):
    /// `base_delay * 2^attempt`, never above `max_delay`.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let doublings = u32::try_from(attempt).map_or(MAX_DOUBLINGS, |n| n.min(MAX_DOUBLINGS));
        self.base_delay
            .saturating_mul(1 << doublings)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(p.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(350));
        assert_eq!(p.backoff_delay(40), Duration::from_millis(350));
    }

    #[test]
    fn zero_base_delay_never_waits() {
        let p = RetryPolicy::none();
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.backoff_delay(3), Duration::ZERO);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let out = fast(3)
            .run(
                "op",
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("flaky")
                    } else {
                        Ok(7)
                    }
                },
                |_| RetryDisposition::Retry,
            )
            .await;

        assert_eq!(out.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_fatal_error() {
        let calls = AtomicUsize::new(0);
        let out: Result<(), _> = fast(5)
            .run(
                "op",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                },
                |_| RetryDisposition::Stop,
            )
            .await;

        assert!(matches!(out, Err(RetryError::Fatal("fatal"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reports_exhausted_attempts() {
        let out: Result<(), _> = fast(2)
            .run("op", || async { Err("flaky") }, |_| RetryDisposition::Retry)
            .await;

        match out {
            Err(RetryError::AttemptsExceeded { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last, "flaky");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
