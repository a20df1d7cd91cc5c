//! Per-key rate limiting.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TroupeError};

/// Remaining quota after a successful check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Rate-limiting collaborator. An exceeded condition is signalled as
/// [`TroupeError::RateLimited`] carrying a retry-after hint.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_and_wait(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<RateLimitStatus>;
}

/// Fixed-window counter per key.
pub struct WindowRateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl WindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for WindowRateLimiter {
    async fn check_and_wait(
        &self,
        key: &str,
        _cancel: &CancellationToken,
    ) -> Result<RateLimitStatus> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let (start, count) = windows
            .entry(key.to_string())
            .or_insert_with(|| (now, 0));
        if now.duration_since(*start) >= self.window {
            *start = now;
            *count = 0;
        }
        if *count >= self.limit {
            let retry_after = self.window.saturating_sub(now.duration_since(*start));
            return Err(TroupeError::RateLimited {
                retry_after: Some(retry_after),
            });
        }
        *count += 1;
        Ok(RateLimitStatus {
            remaining: self.limit - *count,
            reset_after: self.window.saturating_sub(now.duration_since(*start)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limits_within_a_window_and_resets_after() {
        let limiter = WindowRateLimiter::new(2, Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let first = limiter.check_and_wait("u1", &cancel).await.unwrap();
        assert_eq!(first.remaining, 1);
        limiter.check_and_wait("u1", &cancel).await.unwrap();

        let exceeded = limiter.check_and_wait("u1", &cancel).await.unwrap_err();
        assert!(exceeded.retry_after().is_some());

        // Other keys are unaffected.
        limiter.check_and_wait("u2", &cancel).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.check_and_wait("u1", &cancel).await.unwrap();
    }
}
