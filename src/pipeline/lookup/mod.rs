//! External lookup subsystem: rate limiter, retry policy, provider chain
//! and the coalescing cache that fronts them.

pub mod cache;
pub mod provider_chain;
pub mod rate_limiter;
pub mod retry;

pub use cache::{CacheStatsSnapshot, LookupCache};
pub use provider_chain::ProviderChain;
pub use rate_limiter::{Limits, RateLimiter};
pub use retry::{RetryDecision, RetryPolicy, Retryable};
