mod common;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use common::{key, sao_paulo, ScriptedProvider};
use mdm_pipeline::common::LookupFailure;
use mdm_pipeline::domain::{LookupKey, LookupResult};
use mdm_pipeline::pipeline::lookup::{LookupCache, ProviderChain, RateLimiter, RetryPolicy};

fn cache_over(primary: Arc<ScriptedProvider>) -> LookupCache {
    let chain = ProviderChain::new(RetryPolicy::immediate(3)).with_primary(primary);
    LookupCache::new(chain, RateLimiter::unlimited())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_upstream_lookup() {
    let primary = Arc::new(
        ScriptedProvider::new("primary")
            .answering(Ok(sao_paulo()))
            .with_delay(Duration::from_millis(100)),
    );
    let cache = Arc::new(cache_over(primary.clone()));

    let callers = (0..16).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.resolve(&key("01310-100")).await })
    });
    let results: Vec<LookupResult> = join_all(callers)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(primary.calls(), 1);
    assert!(results.iter().all(|r| *r == sao_paulo()));

    let stats = cache.stats();
    assert_eq!(stats.upstream, 1);
    assert_eq!(stats.hits + stats.coalesced, 15);
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn resolved_entries_are_served_from_cache() {
    let primary = Arc::new(ScriptedProvider::new("primary").answering(Ok(sao_paulo())));
    let cache = cache_over(primary.clone());

    assert_eq!(cache.resolve(&key("01310100")).await, sao_paulo());
    // same key written differently
    assert_eq!(cache.resolve(&key("01310-100")).await, sao_paulo());

    assert_eq!(primary.calls(), 1);
    assert_eq!(cache.cached(&key("01310100")), Some(sao_paulo()));
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test]
async fn cleared_cache_goes_back_upstream() {
    let primary = Arc::new(ScriptedProvider::new("primary").answering(Ok(sao_paulo())));
    let cache = cache_over(primary.clone());

    cache.resolve(&key("01310100")).await;
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.cached(&key("01310100")), None);

    assert_eq!(cache.resolve(&key("01310100")).await, sao_paulo());
    assert_eq!(primary.calls(), 2);
    assert_eq!(cache.stats().upstream, 2);
}

#[tokio::test]
async fn empty_results_are_not_cached() {
    let primary = Arc::new(
        ScriptedProvider::new("primary")
            .then(Ok(LookupResult::empty()))
            .answering(Ok(sao_paulo())),
    );
    let cache = cache_over(primary.clone());

    assert!(cache.resolve(&key("01310100")).await.is_empty());
    assert!(cache.is_empty());
    assert_eq!(cache.in_flight(), 0);

    // next request goes back upstream and this time finds it
    assert_eq!(cache.resolve(&key("01310100")).await, sao_paulo());
    assert_eq!(primary.calls(), 2);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn exhausted_retries_resolve_empty_and_release_the_key() {
    let primary = Arc::new(
        ScriptedProvider::new("primary").answering(Err(LookupFailure::Transient("connection reset".into()))),
    );
    let cache = cache_over(primary.clone());

    assert!(cache.resolve(&key("01310100")).await.is_empty());
    assert_eq!(primary.calls(), 3);
    assert_eq!(cache.in_flight(), 0);
    assert!(cache.cached(&key("01310100")).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn country_is_part_of_the_key() {
    let primary = Arc::new(ScriptedProvider::new("primary").answering(Ok(sao_paulo())));
    let cache = cache_over(primary.clone());

    let br = LookupKey::parse("10115", Some("br")).unwrap();
    let de = LookupKey::parse("10115", Some("DE")).unwrap();
    cache.resolve(&br).await;
    cache.resolve(&de).await;

    assert_eq!(primary.calls(), 2);
    assert_eq!(cache.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rate_limiter_caps_distinct_keys_in_flight() {
    let primary = Arc::new(
        ScriptedProvider::new("primary")
            .answering(Ok(sao_paulo()))
            .with_delay(Duration::from_millis(50)),
    );
    let chain = ProviderChain::new(RetryPolicy::immediate(1)).with_primary(primary.clone());
    let limiter = RateLimiter::new(mdm_pipeline::pipeline::lookup::Limits::concurrency(2));
    let cache = Arc::new(LookupCache::new(chain, limiter.clone()));

    let started = tokio::time::Instant::now();
    let callers = ["11111111", "22222222", "33333333", "44444444"].map(|code| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.resolve(&key(code)).await })
    });
    for joined in join_all(callers).await {
        assert!(!joined.unwrap().is_empty());
    }

    // four calls, two at a time
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(primary.calls(), 4);
    assert_eq!(limiter.available(), Some(2));
}
