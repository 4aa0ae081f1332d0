use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Fixed-delay retry policy. `max_retries` counts retries, not attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

/// On-disk shape of the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay_ms: RETRY_DELAY.as_millis() as u64,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(cfg: RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            delay: Duration::from_millis(cfg.delay_ms),
        }
    }
}

/// Run `operation` with the default policy: 3 retries, 1s apart.
pub async fn retry<T, E, F, Fut>(operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with(RetryPolicy::default(), operation).await
}

/// Run `operation`, retrying failures after a fixed delay until the policy's
/// retries are used up; the last failure is returned.
///
/// Every error counts, cancellation included.
pub async fn retry_with<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut remaining = policy.max_retries;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if remaining == 0 => return Err(err),
            Err(err) => {
                let attempt = policy.max_retries - remaining + 1;
                tracing::warn!(
                    attempt,
                    error = %err,
                    "operation failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                remaining -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_initial_call_plus_retries() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), String> = retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom".to_string()) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1 + MAX_RETRIES);
        assert_eq!(started.elapsed().as_millis(), (RETRY_DELAY * MAX_RETRIES).as_millis());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_success() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("fail {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_fixed_delay_between_attempts() {
        let policy = RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(250),
        };
        let stamps = parking_lot::Mutex::new(Vec::new());
        let started = Instant::now();

        let _: Result<(), &str> = retry_with(policy, || {
            stamps.lock().push(started.elapsed().as_millis());
            async { Err("nope") }
        })
        .await;

        assert_eq!(*stamps.lock(), vec![0, 250, 500]);
    }

    #[tokio::test]
    async fn zero_retries_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 0,
            delay: Duration::from_secs(10),
        };

        let result: Result<(), &str> = retry_with(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("once") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
