use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Maximum upstream calls in flight at once, process-wide
    pub concurrency: Option<u32>,
}

impl Limits {
    pub fn concurrency(max_in_flight: u32) -> Self {
        Self {
            concurrency: Some(max_in_flight),
        }
    }
}

/// Gate in front of every external lookup call.
///
/// Cloning shares the same permits; construct one per process and hand clones
/// to whoever needs it.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    sem: Option<Arc<Semaphore>>,
}

/// Held for the duration of one upstream call; dropping it frees the slot.
#[derive(Debug)]
pub struct RatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        let sem = limits
            .concurrency
            .map(|c| Arc::new(Semaphore::new(c.max(1) as usize)));
        Self {
            inner: Arc::new(Inner { sem }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Limits::default())
    }

    /// Wait for a slot. The returned permit must be kept alive around the call it guards.
    pub async fn acquire(&self) -> RatePermit {
        let permit = match &self.inner.sem {
            Some(sem) => match sem.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    // Only happens if the semaphore was closed, which nothing does
                    warn!("rate limiter semaphore unavailable: {}", e);
                    None
                }
            },
            None => None,
        };

        RatePermit { _permit: permit }
    }

    /// Free slots right now, or `None` when concurrency is unbounded
    pub fn available(&self) -> Option<usize> {
        self.inner.sem.as_ref().map(|s| s.available_permits())
    }
}
