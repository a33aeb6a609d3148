//! Retry with exponential backoff for transport-level failures

use renum_core::{RenumError, RenumResult, RETRY_BACKOFF};
use std::future::Future;

/// Run `op` with the standard backoff schedule (100 ms, 400 ms).
///
/// Only retryable LLM errors are retried; everything else propagates on the
/// first failure. At most `RETRY_BACKOFF.len()` retries happen, so `op` runs
/// at most three times.
pub async fn retry_with_backoff<T, F, Fut>(label: &str, mut op: F) -> RenumResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RenumResult<T>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = matches!(&err, RenumError::Llm(e) if e.is_retryable());
                if !retryable || attempt >= RETRY_BACKOFF.len() {
                    return Err(err);
                }
                let delay = RETRY_BACKOFF[attempt];
                tracing::debug!(
                    label = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transport failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use renum_core::{LlmError, VaultError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient() -> RenumError {
        RenumError::Llm(LlmError::EmbeddingUnavailable {
            reason: "503".to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = retry_with_backoff("embed", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_two_retries() {
        let calls = AtomicUsize::new(0);
        let result: RenumResult<i32> = retry_with_backoff("embed", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_propagate_immediately() {
        let calls = AtomicUsize::new(0);
        let result: RenumResult<i32> = retry_with_backoff("vault", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RenumError::Vault(VaultError::InvalidCiphertext)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
