//! Builds the runtime object graph from settings

use std::sync::Arc;
use tracing::{info, warn};

use crate::app::PostalEnrichUseCase;
use crate::common::constants::{
    LLM_CONNECT_TIMEOUT_SECS, PROVIDER_CONNECT_TIMEOUT_SECS, PROVIDER_REQUEST_TIMEOUT_SECS,
};
use crate::common::error::Result;
use crate::config::Settings;
use crate::infra::http_client::{build_client, HttpTimeouts};
use crate::infra::{OllamaClient, PromptTemplates, RoundRobin, ViaCepProvider, ZipcodebaseProvider};
use crate::pipeline::coordinator::PipelineCoordinator;
use crate::pipeline::lookup::{LookupCache, ProviderChain, RateLimiter};

/// Long-lived services shared by the CLI and the HTTP server
#[derive(Clone)]
pub struct Services {
    pub coordinator: Arc<PipelineCoordinator>,
    pub llm: Arc<OllamaClient>,
    pub lookups: Arc<LookupCache>,
}

pub fn build_services(settings: &Settings) -> Result<Services> {
    settings.validate()?;

    let llm = Arc::new(build_llm_client(settings)?);
    let lookups = Arc::new(build_lookup_cache(settings)?);

    let mut coordinator = PipelineCoordinator::new(llm.clone(), llm.clone())
        .with_concurrency(settings.stage_concurrency());
    if settings.use_postal_lookup {
        coordinator = coordinator.with_postal_lookup(PostalEnrichUseCase::new(lookups.clone()));
    }
    info!(
        "🔧 Pipeline ready: {} LLM endpoint(s), postal lookup {}",
        settings.ollama_endpoints.len(),
        if settings.use_postal_lookup { "enabled" } else { "disabled" }
    );

    Ok(Services {
        coordinator: Arc::new(coordinator),
        llm,
        lookups,
    })
}

pub fn build_llm_client(settings: &Settings) -> Result<OllamaClient> {
    let client = build_client(HttpTimeouts::from_secs(LLM_CONNECT_TIMEOUT_SECS, settings.request_timeout))?;
    let endpoints = Arc::new(RoundRobin::new(settings.ollama_endpoints.clone())?);
    let prompts = PromptTemplates::load(settings.prompt_dir.as_deref())?;
    Ok(OllamaClient::new(client, endpoints)
        .with_models(settings.llm_models())
        .with_options(settings.llm_options())
        .with_prompts(prompts))
}

/// Primary provider only with an API key; the Brazil-only fallback is always present
pub fn build_lookup_cache(settings: &Settings) -> Result<LookupCache> {
    let client = build_client(HttpTimeouts::from_secs(
        PROVIDER_CONNECT_TIMEOUT_SECS,
        PROVIDER_REQUEST_TIMEOUT_SECS,
    ))?;

    let mut chain = ProviderChain::new(settings.lookup_retry_policy());
    if settings.has_zipcodebase_key() {
        chain = chain.with_primary(Arc::new(ZipcodebaseProvider::new(
            client.clone(),
            settings.zipcodebase_url.clone(),
            settings.zipcodebase_key.clone(),
        )));
    } else if settings.use_postal_lookup {
        warn!("ZIPCODEBASE_KEY is not set; postal lookups use the fallback provider only");
    }
    chain = chain.with_fallback(Arc::new(ViaCepProvider::new(client, settings.viacep_url.clone())));

    Ok(LookupCache::new(chain, RateLimiter::new(settings.lookup_limits())))
}
