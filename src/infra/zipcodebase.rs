//! Primary postal provider: authenticated search endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::time::Duration;

use crate::app::ports::LookupProvider;
use crate::common::error::LookupFailure;
use crate::domain::{LookupKey, LookupResult};

const ERROR_BODY_PREVIEW: usize = 200;

pub struct ZipcodebaseProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ZipcodebaseProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LookupProvider for ZipcodebaseProvider {
    fn name(&self) -> &'static str {
        "zipcodebase"
    }

    fn supports(&self, _key: &LookupKey) -> bool {
        true
    }

    async fn lookup(&self, key: &LookupKey) -> Result<LookupResult, LookupFailure> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("codes", key.digits()),
                ("country", key.country()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LookupFailure::from_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(resp.headers());
            let body: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_PREVIEW)
                .collect();
            return Err(LookupFailure::from_status(status.as_u16(), retry_after, body));
        }

        let body: Value = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                LookupFailure::Transient(e.to_string())
            } else {
                LookupFailure::Unexpected(format!("invalid response body: {}", e))
            }
        })?;
        Ok(map_search_response(&body, key))
    }
}

/// `Retry-After` given as whole seconds. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map `{"results": {"<code>": [ {...}, ... ]}}` to address fields.
///
/// A missing code or an empty list is "not found".
pub fn map_search_response(body: &Value, key: &LookupKey) -> LookupResult {
    let Some(first) = body
        .get("results")
        .and_then(|r| r.get(key.digits()))
        .and_then(Value::as_array)
        .and_then(|list| list.first())
    else {
        return LookupResult::empty();
    };

    let text = |field: &str| {
        first
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    LookupResult {
        thoroughfare: text("street"),
        house_number: None,
        neighborhood: text("district"),
        city: text("city"),
        state: text("state_code").or_else(|| text("state")),
        postal_code: Some(key.hyphenated().unwrap_or_else(|| key.digits().to_string())),
        country_code: Some(key.country().to_string()),
        complement: None,
    }
}
