//! Shared retry-with-backoff helper for gateway calls. Transient errors
//! (`CoreError::is_transient`) are retried up to `max_retries` times with a
//! doubling delay; everything else returns immediately.

use crate::errors::CoreError;
use std::time::Duration;
use tracing::warn;

pub async fn with_retry<T, F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    backoff: u32,
    mut attempt: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CoreError>>,
{
    let mut delay = base_delay;
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && tries < max_retries => {
                tries += 1;
                warn!(attempt = tries, error = %e, "gateway call failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= backoff;
            }
            Err(e) => return Err(e),
        }
    }
}
