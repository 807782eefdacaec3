mod common;

use axum::extract::{Path, Query};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{spawn_server, unused_addr};
use mdm_pipeline::app::ports::{AddressParser, LookupProvider, RecordNormalizer};
use mdm_pipeline::common::LookupFailure;
use mdm_pipeline::domain::{LookupKey, Record};
use mdm_pipeline::infra::http_client::{build_client, HttpTimeouts};
use mdm_pipeline::infra::{OllamaClient, RoundRobin, ViaCepProvider, ZipcodebaseProvider};

fn client() -> reqwest::Client {
    build_client(HttpTimeouts::from_secs(2, 5)).unwrap()
}

fn br(code: &str) -> LookupKey {
    LookupKey::parse(code, Some("BR")).unwrap()
}

async fn zipcodebase_search(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let authorized = params.get("apikey").map(String::as_str) == Some("test-key");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid api key" }))).into_response();
    }
    let code = params.get("codes").cloned().unwrap_or_default();
    let country = params.get("country").cloned().unwrap_or_default();
    let results = if code == "01310100" && country == "BR" {
        let mut by_code = serde_json::Map::new();
        by_code.insert(
            code.clone(),
            json!([ {
                "postal_code": "01310-100",
                "country_code": "BR",
                "city": "São Paulo",
                "state": "São Paulo",
                "state_code": "SP",
                "district": "Bela Vista"
            } ]),
        );
        Value::Object(by_code)
    } else {
        json!([])
    };
    Json(json!({ "query": { "codes": [code] }, "results": results })).into_response()
}

fn zipcodebase_router() -> Router {
    Router::new()
        .route("/search", get(zipcodebase_search))
        .route(
            "/limited",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "7")], "slow down") }),
        )
        .route("/down", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }))
        .route("/garbage", get(|| async { "<html>not json</html>" }))
}

#[tokio::test]
async fn zipcodebase_maps_a_found_code() {
    let addr = spawn_server(zipcodebase_router());
    let provider = ZipcodebaseProvider::new(client(), format!("http://{}/search", addr), "test-key");

    let result = provider.lookup(&br("01310-100")).await.unwrap();
    assert_eq!(result.city.as_deref(), Some("São Paulo"));
    assert_eq!(result.state.as_deref(), Some("SP"));
    assert_eq!(result.neighborhood.as_deref(), Some("Bela Vista"));
    assert_eq!(result.postal_code.as_deref(), Some("01310-100"));

    // unknown code: `results` comes back as an empty list
    assert!(provider.lookup(&br("99999999")).await.unwrap().is_empty());
}

#[tokio::test]
async fn zipcodebase_classifies_failures() {
    let addr = spawn_server(zipcodebase_router());
    let at = |path: &str, key: &str| ZipcodebaseProvider::new(client(), format!("http://{}{}", addr, path), key);

    let err = at("/limited", "test-key").lookup(&br("01310100")).await.unwrap_err();
    assert_eq!(
        err,
        LookupFailure::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );

    let err = at("/search", "wrong-key").lookup(&br("01310100")).await.unwrap_err();
    assert!(matches!(err, LookupFailure::PermanentClient { status: 401, .. }));

    let err = at("/down", "test-key").lookup(&br("01310100")).await.unwrap_err();
    assert!(matches!(err, LookupFailure::Transient(_)));

    let err = at("/garbage", "test-key").lookup(&br("01310100")).await.unwrap_err();
    assert!(matches!(err, LookupFailure::Unexpected(_)));
}

#[tokio::test]
async fn unreachable_provider_is_transient() {
    let provider = ZipcodebaseProvider::new(client(), format!("http://{}/search", unused_addr()), "test-key");
    let err = provider.lookup(&br("01310100")).await.unwrap_err();
    assert!(matches!(err, LookupFailure::Transient(_)), "got {:?}", err);
}

async fn viacep_lookup(Path(cep): Path<String>) -> impl IntoResponse {
    match cep.as_str() {
        "01001000" => Json(json!({
            "cep": "01001-000",
            "logradouro": "Praça da Sé",
            "bairro": "Sé",
            "localidade": "São Paulo",
            "uf": "SP"
        }))
        .into_response(),
        "99999999" => Json(json!({ "erro": "true" })).into_response(),
        _ => (StatusCode::BAD_REQUEST, "invalid cep").into_response(),
    }
}

#[tokio::test]
async fn viacep_found_missing_and_rejected() {
    let addr = spawn_server(Router::new().route("/ws/:cep/json/", get(viacep_lookup)));
    let provider = ViaCepProvider::new(client(), format!("http://{}/ws/", addr));

    let found = provider.lookup(&br("01001-000")).await.unwrap();
    assert_eq!(found.city.as_deref(), Some("São Paulo"));
    assert_eq!(found.neighborhood.as_deref(), Some("Sé"));
    assert_eq!(found.postal_code.as_deref(), Some("01001-000"));
    assert_eq!(found.country_code.as_deref(), Some("BR"));

    assert!(provider.lookup(&br("99999999")).await.unwrap().is_empty());
    // non-200 is "not found", not an error
    assert!(provider.lookup(&br("12345678")).await.unwrap().is_empty());
}

async fn fake_generate(Json(body): Json<Value>) -> impl IntoResponse {
    assert_eq!(body["format"], "json");
    assert_eq!(body["stream"], false);
    assert!(body["prompt"].as_str().unwrap_or("").to_lowercase().contains("ana"));
    let response = match body["model"].as_str() {
        Some("address-model") => json!({
            "thoroughfare": "Rua Augusta",
            "house_number": "500",
            "city": "São Paulo",
            "state": "SP",
            "postal_code": "01305000",
            "country_code": "br"
        }),
        _ => json!({ "id": "c-1", "name": "Ana Lima", "email": "ana@example.com" }),
    };
    Json(json!({ "model": body["model"], "response": response.to_string(), "done": true }))
}

fn ollama_router() -> Router {
    Router::new()
        .route("/api/generate", post(fake_generate))
        .route("/api/tags", get(|| async { Json(json!({ "models": [ { "name": "qwen2.5:7b" } ] })) }))
}

fn ollama(endpoints: Vec<String>) -> OllamaClient {
    OllamaClient::new(client(), Arc::new(RoundRobin::new(endpoints).unwrap())).with_models(
        mdm_pipeline::infra::LlmModels {
            normalize: "normalize-model".to_string(),
            address: "address-model".to_string(),
        },
    )
}

#[tokio::test]
async fn ollama_normalizes_and_parses_addresses() {
    let addr = spawn_server(ollama_router());
    let llm = ollama(vec![format!("http://{}", addr)]);
    let record = Record::new(Some("c-1"))
        .with_field("name", "  ana LIMA ")
        .with_field("address", "R. Augusta 500, SP");

    let normalized = llm.normalize(&record).await.unwrap();
    assert_eq!(normalized.id.as_deref(), Some("c-1"));
    assert_eq!(normalized.get_str("name"), Some("Ana Lima"));

    let parsed = llm.parse_address(&record).await.unwrap();
    assert_eq!(parsed.thoroughfare.as_deref(), Some("Rua Augusta"));
    assert_eq!(parsed.postal_code.as_deref(), Some("01305-000"));
    assert_eq!(parsed.country_code.as_deref(), Some("BR"));

    let tags = llm.ping().await.unwrap();
    assert_eq!(tags["models"][0]["name"], "qwen2.5:7b");
}

#[tokio::test]
async fn ollama_moves_to_the_next_endpoint_after_a_failure() {
    let broken = spawn_server(Router::new().route(
        "/api/generate",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
    ));
    let healthy = spawn_server(ollama_router());
    let llm = ollama(vec![format!("http://{}", broken), format!("http://{}", healthy)]);

    let record = Record::new(Some("c-1")).with_field("name", "Ana");
    let normalized = llm.normalize(&record).await.unwrap();
    assert_eq!(normalized.get_str("email"), Some("ana@example.com"));
}

#[tokio::test]
async fn ollama_gives_up_after_three_attempts() {
    let llm = ollama(vec![format!("http://{}", unused_addr())]);
    let record = Record::new(Some("c-1")).with_field("name", "Ana");
    assert!(llm.normalize(&record).await.is_err());
    assert!(llm.ping().await.is_err());
}
