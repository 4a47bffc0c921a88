//! Rate limiter implementation using governor and Tokio Semaphore.
//!
//! - Governor (GCRA) enforces requests per minute
//! - A Tokio semaphore enforces concurrent requests

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use novelist_core::RateLimitConfig;
use novelist_error::{CompletionError, CompletionErrorKind};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::Semaphore;

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter shared by every completion call of a run.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = RateLimiter::new(&RateLimitConfig {
///     requests_per_minute: Some(60),
///     max_concurrent: Some(2),
/// });
/// let guard = limiter.acquire().await?;
/// let response = driver.generate(&request).await;
/// drop(guard);
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    rpm_limiter: Option<Arc<DirectRateLimiter>>,
    concurrent_semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rpm_limited", &self.rpm_limiter.is_some())
            .field(
                "available_slots",
                &self.concurrent_semaphore.available_permits(),
            )
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter enforcing every limit that is set.
    pub fn new(config: &RateLimitConfig) -> Self {
        let rpm_limiter = config.requests_per_minute.and_then(|rpm| {
            NonZeroU32::new(rpm).map(|n| Arc::new(GovernorRateLimiter::direct(Quota::per_minute(n))))
        });

        let max_concurrent = config
            .max_concurrent
            .map(|n| n as usize)
            .unwrap_or(Semaphore::MAX_PERMITS);
        let concurrent_semaphore = Arc::new(Semaphore::new(max_concurrent));

        Self {
            rpm_limiter,
            concurrent_semaphore,
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(&RateLimitConfig::unlimited())
    }

    /// Wait until every limit allows one more request.
    ///
    /// The returned guard holds a concurrent slot until dropped.
    ///
    /// # Errors
    ///
    /// Returns a `Limiter` error if the semaphore has been closed.
    pub async fn acquire(&self) -> Result<RateLimiterGuard, CompletionError> {
        if let Some(limiter) = &self.rpm_limiter {
            limiter.until_ready().await;
        }

        // Concurrent slot last, so it is not held while waiting on quota
        let permit = self
            .concurrent_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CompletionError::new(CompletionErrorKind::Limiter(e.to_string())))?;

        Ok(RateLimiterGuard { _permit: permit })
    }

    /// Acquire without waiting; `None` if any limit would block.
    pub fn try_acquire(&self) -> Option<RateLimiterGuard> {
        if let Some(limiter) = &self.rpm_limiter {
            limiter.check().ok()?;
        }
        let permit = self.concurrent_semaphore.clone().try_acquire_owned().ok()?;
        Some(RateLimiterGuard { _permit: permit })
    }
}

/// RAII guard releasing the concurrent slot when dropped.
#[derive(Debug)]
pub struct RateLimiterGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
