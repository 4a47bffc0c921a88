//! Retry and rate limiting for completion calls.
//!
//! Every completion attempt passes through the [`RateLimiter`], and every
//! call site retries through [`retry_with_backoff`], so failure semantics are
//! the same wherever the pipeline talks to the model.

mod limiter;
mod retry;

pub use limiter::{RateLimiter, RateLimiterGuard};
pub use retry::retry_with_backoff;
