//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

/// Run `fut` with a deadline, mapping expiry to [`GatewayError::Timeout`].
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(duration.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_maps_to_timeout() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Timeout(50))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_error_passes_through() {
        let result: Result<(), _> = with_timeout(Duration::from_secs(1), async {
            Err(GatewayError::Upstream("refused".into()))
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Upstream(_))));
    }
}
