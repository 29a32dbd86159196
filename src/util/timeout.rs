//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ConnectError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ConnectError>>,
) -> Result<T, ConnectError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Timeout(duration.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_wait_becomes_timeout_error() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ConnectError::Timeout(50))));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let result: Result<(), _> = with_timeout(Duration::from_secs(1), async {
            Err(ConnectError::Abandoned("closed".into()))
        })
        .await;
        assert!(matches!(result, Err(ConnectError::Abandoned(_))));
    }
}
