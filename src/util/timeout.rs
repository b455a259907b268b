//! Deadline for a single remote exchange.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{ParleyError, Result};

/// Resolve `exchange`, or fail with [`ParleyError::Timeout`] once `limit`
/// has elapsed. The exchange future is dropped on expiry.
pub async fn with_timeout<T>(limit: Duration, exchange: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, exchange)
        .await
        .unwrap_or_else(|_elapsed| {
            let limit_ms = whole_millis(limit);
            debug!(limit_ms, "exchange deadline elapsed");
            Err(ParleyError::Timeout(limit_ms))
        })
}

/// Milliseconds in `duration`, saturating instead of truncating.
pub(crate) fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
