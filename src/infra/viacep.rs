//! Fallback postal provider: free, unauthenticated, Brazil only.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use crate::app::ports::LookupProvider;
use crate::common::error::LookupFailure;
use crate::domain::{LookupKey, LookupResult};

const SUPPORTED_COUNTRY: &str = "BR";

pub struct ViaCepProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ViaCepProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LookupProvider for ViaCepProvider {
    fn name(&self) -> &'static str {
        "viacep"
    }

    fn supports(&self, key: &LookupKey) -> bool {
        key.country() == SUPPORTED_COUNTRY
    }

    async fn lookup(&self, key: &LookupKey) -> Result<LookupResult, LookupFailure> {
        let url = format!("{}/{}/json/", self.base_url, key.digits());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupFailure::from_transport(&e))?;

        if resp.status() != StatusCode::OK {
            warn!(status = resp.status().as_u16(), %key, "viacep returned non-200");
            return Ok(LookupResult::empty());
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| LookupFailure::Unexpected(format!("invalid response body: {}", e)))?;
        Ok(map_viacep_response(&body, key))
    }
}

/// Map a ViaCEP body. The `erro` flag (boolean or `"true"`) means not found.
pub fn map_viacep_response(body: &Value, key: &LookupKey) -> LookupResult {
    let not_found = match body.get("erro") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    if not_found || !body.is_object() {
        return LookupResult::empty();
    }

    let text = |field: &str| {
        body.get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    LookupResult {
        thoroughfare: None,
        house_number: None,
        neighborhood: text("bairro"),
        city: text("localidade"),
        state: text("uf"),
        postal_code: key.hyphenated(),
        country_code: Some(SUPPORTED_COUNTRY.to_string()),
        complement: None,
    }
}
