//! Fixed-delay retry of transient store failures.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

/// Run `op`, retrying up to `retries` more times while it fails with a
/// retryable error.
pub async fn with_retry<T, F, Fut>(retries: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!("Transient store error (retry {}/{}): {}", attempt, retries, e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgressError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use trainpath_storage::StorageError;

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(2, Duration::from_millis(1), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProgressError::StoreUnavailable(StorageError::Unavailable("offline".into())))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(1, Duration::from_millis(1), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProgressError::StoreUnavailable(StorageError::Unavailable("offline".into())))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(5, Duration::from_millis(1), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProgressError::PathNotFound(trainpath_core::PathId::new()))
        })
        .await;
        assert!(matches!(result, Err(ProgressError::PathNotFound(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
