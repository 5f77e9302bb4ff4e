//! Bounded retry with exponentially widening timeout, shared by every
//! one-shot metadata fetch (target lookup, sensor batch queries,
//! schedule-block queries).

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries `op` up to `retries` times. The timeout for attempt `k` (0-based)
/// is `base_timeout * (1 + factor * k)` — linear growth from `base_timeout`,
/// not compounding. Returns the last error if every attempt fails.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut op: F,
    base_timeout: Duration,
    retries: u32,
    factor: f64,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        let timeout = base_timeout.mul_f64(1.0 + factor * attempt as f64);
        match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                attempt += 1;
                if attempt >= retries {
                    return Err(e);
                }
                warn!("attempt {attempt}/{retries} failed: {e}; retrying with widened timeout");
            }
            Err(_elapsed) => {
                attempt += 1;
                if attempt >= retries {
                    // Re-run once more to surface a real error to the caller
                    // rather than synthesizing one from the elapsed timeout.
                    return op().await;
                }
                warn!("attempt {attempt}/{retries} timed out after {timeout:?}; retrying with widened timeout");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let result: Result<i32, &str> = retry_with_backoff(
            || async { Ok(42) },
            Duration::from_millis(10),
            3,
            0.5,
        )
        .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<i32, &str> = retry_with_backoff(
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(7)
                }
            },
            Duration::from_millis(10),
            5,
            0.5,
        )
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_error() {
        let result: Result<i32, &str> = retry_with_backoff(
            || async { Err("nope") },
            Duration::from_millis(5),
            3,
            0.5,
        )
        .await;
        assert_eq!(result, Err("nope"));
    }
}
