mod common;

use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{key, spawn_server};
use mdm_pipeline::bootstrap::build_lookup_cache;
use mdm_pipeline::config::Settings;

fn counted(hits: Arc<AtomicUsize>, router: impl FnOnce(Arc<AtomicUsize>) -> Router) -> String {
    let addr = spawn_server(router(hits));
    format!("http://{}", addr)
}

#[tokio::test]
async fn missing_api_key_goes_straight_to_the_fallback() {
    let primary_hits = Arc::new(AtomicUsize::new(0));
    let fallback_hits = Arc::new(AtomicUsize::new(0));

    let primary_base = counted(primary_hits.clone(), |hits| {
        Router::new().route(
            "/search",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "results": {} }))
                }
            }),
        )
    });
    let fallback_base = counted(fallback_hits.clone(), |hits| {
        Router::new().route(
            "/ws/:cep/json/",
            get(move |Path(cep): Path<String>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "cep": format!("{}-{}", &cep[..5], &cep[5..]),
                        "logradouro": "Avenida Paulista",
                        "bairro": "Bela Vista",
                        "localidade": "São Paulo",
                        "uf": "SP"
                    }))
                }
            }),
        )
    });

    let settings = Settings {
        use_postal_lookup: true,
        zipcodebase_key: String::new(),
        zipcodebase_url: format!("{}/search", primary_base),
        viacep_url: format!("{}/ws", fallback_base),
        ..Settings::default()
    };
    assert!(!settings.has_zipcodebase_key());

    let cache = build_lookup_cache(&settings).unwrap();
    let result = cache.resolve(&key("01310100")).await;

    assert_eq!(primary_hits.load(Ordering::SeqCst), 0);
    assert_eq!(fallback_hits.load(Ordering::SeqCst), 1);
    assert_eq!(result.city.as_deref(), Some("São Paulo"));
    assert_eq!(result.postal_code.as_deref(), Some("01310-100"));
    assert_eq!(cache.stats().upstream, 1);
}

#[tokio::test]
async fn whitespace_key_counts_as_missing() {
    let settings = Settings {
        zipcodebase_key: "   ".to_string(),
        ..Settings::default()
    };
    assert!(!settings.has_zipcodebase_key());
}
