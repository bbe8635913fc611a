//! Bounded exponential-backoff retry for store operations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Run `op` up to `1 + max_retries` times, sleeping `base * 2^attempt`
/// between tries. Only `Transient` failures are retried; once the ceiling is
/// hit the last failure surfaces as `Unavailable`.
pub(crate) async fn with_retry<T, F, Fut>(
    label: &str,
    max_retries: u32,
    base: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = base.saturating_mul(1u32 << attempt.min(16));
                warn!(op = label, attempt, error = %e, delay_ms = delay.as_millis() as u64, "transient store failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(Error::Transient(msg)) => {
                warn!(op = label, attempt, "retries exhausted");
                return Err(Error::Unavailable(msg));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", 3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Transient("blip".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_unavailable() {
        let result: Result<()> = with_retry("test", 2, Duration::from_millis(1), || async {
            Err(Error::Transient("down".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn conflict_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Conflict("duplicate".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
