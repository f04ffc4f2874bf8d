//! Bounded retry with exponential backoff.
//!
//! One policy object replaces per-call-site retry loops. Retryable failures
//! (quota, transient network) are re-run with a growing delay; everything
//! else propagates on first occurrence. Abandoning the returned future
//! cancels any pending backoff sleep.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use common::config::RetryConfig;
use common::Error;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_factor: backoff_factor.max(1.0),
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self::new(
            cfg.max_retries,
            Duration::from_millis(cfg.initial_delay_ms),
            cfg.backoff_factor,
        )
    }

    /// Run `op`, retrying retryable failures up to `max_retries` times.
    ///
    /// Exhausting the budget returns the last error annotated with the
    /// total attempt count.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut delay = self.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    warn!(
                        "{}: attempt {}/{} failed ({}); retrying in {:?}",
                        label, attempt, self.max_retries, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.backoff_factor);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(max_retries: u32, initial_ms: u64, factor: f64) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(initial_ms), factor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = Instant::now();

        let result = policy(3, 100, 2.0)
            .run("read_range", move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::Transient("socket closed".into()))
                    } else {
                        Ok(7u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoff between attempts: 100ms then 200ms.
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), Error> = policy(3, 100, 2.0)
            .run("open", move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Unauthorized("bad credential".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_annotated() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), Error> = policy(2, 100, 3.0)
            .run("read_range", move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::QuotaExceeded("429".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, Error::QuotaExceeded(_)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_by_factor() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = Instant::now();

        let _: Result<(), Error> = policy(3, 200, 2.0)
            .run("read_range", move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Transient("reset".into()))
                }
            })
            .await;

        // Waits: 200 + 400 + 800 = 1400ms across the three retries.
        assert!(start.elapsed() >= Duration::from_millis(1400));
    }
}
