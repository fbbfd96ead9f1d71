//! Retry logic for transient resolution failures.

use std::time::Duration;

use super::resolver::{ResolutionError, ResolveResult};

/// Executes a resolution with retry on transient errors.
///
/// The first attempt runs immediately; each entry in `delays_ms` adds one more
/// attempt after sleeping that long. Non-transient errors return at once.
///
/// # Arguments
/// * `action` - Label for logging
/// * `delays_ms` - Backoff before each retry
/// * `operation` - Closure that performs one attempt
pub(crate) async fn with_retry<T, F, Fut>(
    action: &str,
    delays_ms: &[u64],
    mut operation: F,
) -> ResolveResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ResolveResult<T>>,
{
    let mut last_error: Option<ResolutionError> = None;
    for (attempt, &delay_ms) in std::iter::once(&0).chain(delays_ms.iter()).enumerate() {
        if attempt > 0 {
            log::info!(
                "[Resolver] Retrying {} (attempt {}/{}) after {}ms",
                action,
                attempt + 1,
                delays_ms.len() + 1,
                delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() => {
                log::warn!("[Resolver] {} transient error: {}", action, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| ResolutionError::Network(format!("{action} was never attempted"))))
}
