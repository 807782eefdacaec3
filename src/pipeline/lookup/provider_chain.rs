use std::sync::Arc;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use crate::app::ports::LookupProvider;
use crate::domain::{LookupKey, LookupResult};
use crate::observability::metrics;

/// Ordered providers: a retried primary, then a single-shot regional fallback.
///
/// `resolve` never fails. Every provider error ends up as an empty result and a log line.
pub struct ProviderChain {
    primary: Option<Arc<dyn LookupProvider>>,
    fallback: Option<Arc<dyn LookupProvider>>,
    policy: RetryPolicy,
}

impl ProviderChain {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            primary: None,
            fallback: None,
            policy,
        }
    }

    /// Primary provider, retried under the chain's policy
    pub fn with_primary(mut self, provider: Arc<dyn LookupProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    /// Fallback provider, tried once and only for regions it supports
    pub fn with_fallback(mut self, provider: Arc<dyn LookupProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    pub fn has_providers(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    pub async fn resolve(&self, key: &LookupKey) -> LookupResult {
        if let Some(primary) = self.primary.as_ref().filter(|p| p.supports(key)) {
            let result = self.resolve_primary(primary.as_ref(), key).await;
            if !result.is_empty() {
                return result;
            }
        }

        match self.fallback.as_ref().filter(|f| f.supports(key)) {
            Some(fallback) => self.resolve_fallback(fallback.as_ref(), key).await,
            None => LookupResult::empty(),
        }
    }

    async fn resolve_primary(&self, provider: &dyn LookupProvider, key: &LookupKey) -> LookupResult {
        let name = provider.name();
        let outcome = self
            .policy
            .run(name, |attempt| async move {
                debug!(provider = name, %key, attempt, "lookup attempt");
                let out = provider.lookup(key).await;
                match &out {
                    Ok(_) => metrics::lookup::provider_attempt(name, "ok"),
                    Err(e) => metrics::lookup::provider_attempt(name, e.kind()),
                }
                out
            })
            .await;

        match outcome {
            Ok(result) => {
                if result.is_empty() {
                    info!(provider = name, %key, "no result from primary");
                }
                result
            }
            Err(e) => {
                warn!(provider = name, %key, kind = e.kind(), error = %e, "primary yielded nothing");
                LookupResult::empty()
            }
        }
    }

    async fn resolve_fallback(&self, provider: &dyn LookupProvider, key: &LookupKey) -> LookupResult {
        let name = provider.name();
        match provider.lookup(key).await {
            Ok(result) => {
                metrics::lookup::provider_attempt(name, "ok");
                result
            }
            Err(e) => {
                metrics::lookup::provider_attempt(name, e.kind());
                warn!(provider = name, %key, error = %e, "fallback lookup failed");
                LookupResult::empty()
            }
        }
    }
}
