//! Ollama-backed record normalization and address parsing.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use super::endpoint_selector::RoundRobin;
use super::json_text::extract_json;
use crate::app::ports::{AddressParser, RecordNormalizer};
use crate::common::constants::{DEFAULT_MODEL, LLM_MAX_ATTEMPTS, PROMPT_INPUT_PLACEHOLDER};
use crate::common::error::{PipelineError, Result};
use crate::domain::{format_eight_digit_code, AddressFields, Record};
use crate::pipeline::lookup::{RetryDecision, RetryPolicy, Retryable};

static EIGHT_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").expect("valid regex"));

const CUSTOMER_PROMPT_FILE: &str = "customer_prompt.txt";
const ADDRESS_PROMPT_FILE: &str = "address_prompt.txt";

const BUILTIN_CUSTOMER_PROMPT: &str = r#"You clean customer master data.
Return ONLY a JSON object with the same keys as the input record.
Trim whitespace, fix capitalization of names and cities, keep emails lower-case,
format phone numbers with digits only (country code first when known) and never invent values.
Keep "id" and "_parsed" untouched.

Record:
{input_json}
"#;

const BUILTIN_ADDRESS_PROMPT: &str = r#"You split postal addresses into components.
Return ONLY a JSON object with exactly these keys:
thoroughfare, house_number, neighborhood, city, state, postal_code, country_code, complement.
Use null for anything not present. state is the two-letter code when known.
postal_code keeps only digits and the hyphen. country_code is ISO 3166-1 alpha-2.

Record:
{input_json}
"#;

/// Generation options forwarded verbatim to the model server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmOptions {
    pub num_ctx: u32,
    pub num_batch: u32,
    pub num_gpu: u32,
    pub num_thread: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            num_ctx: 4096,
            num_batch: 512,
            num_gpu: 22,
            num_thread: 16,
            temperature: 0.0,
            top_p: 1.0,
            top_k: 40,
        }
    }
}

/// Prompt templates; `{input_json}` is replaced by the serialized record
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplates {
    pub customer: String,
    pub address: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            customer: BUILTIN_CUSTOMER_PROMPT.to_string(),
            address: BUILTIN_ADDRESS_PROMPT.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Load overrides from `dir`; a missing file keeps the built-in template.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut templates = Self::default();
        let Some(dir) = dir else {
            return Ok(templates);
        };
        if let Some(text) = read_template(&dir.join(CUSTOMER_PROMPT_FILE))? {
            templates.customer = text;
        }
        if let Some(text) = read_template(&dir.join(ADDRESS_PROMPT_FILE))? {
            templates.address = text;
        }
        Ok(templates)
    }
}

fn read_template(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    if !text.contains(PROMPT_INPUT_PLACEHOLDER) {
        return Err(PipelineError::Config(format!(
            "prompt template {} lacks the {} placeholder",
            path.display(),
            PROMPT_INPUT_PLACEHOLDER
        )));
    }
    Ok(Some(text))
}

pub fn render_prompt(template: &str, record: &Record) -> String {
    let input = serde_json::to_string(&record.to_value()).unwrap_or_else(|_| "{}".to_string());
    template.replace(PROMPT_INPUT_PLACEHOLDER, &input)
}

/// One failed generation attempt; every kind is worth another try
#[derive(Error, Debug)]
pub enum LlmFailure {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model output is not JSON: {0}")]
    Output(#[from] serde_json::Error),
}

impl Retryable for LlmFailure {
    fn retry_decision(&self) -> RetryDecision {
        RetryDecision::Retry { after: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmModels {
    pub normalize: String,
    pub address: String,
}

impl Default for LlmModels {
    fn default() -> Self {
        Self {
            normalize: DEFAULT_MODEL.to_string(),
            address: DEFAULT_MODEL.to_string(),
        }
    }
}

pub struct OllamaClient {
    client: reqwest::Client,
    endpoints: Arc<RoundRobin>,
    models: LlmModels,
    options: LlmOptions,
    prompts: PromptTemplates,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, endpoints: Arc<RoundRobin>) -> Self {
        Self {
            client,
            endpoints,
            models: LlmModels::default(),
            options: LlmOptions::default(),
            prompts: PromptTemplates::default(),
            retry: RetryPolicy::immediate(LLM_MAX_ATTEMPTS),
        }
    }

    pub fn with_models(mut self, models: LlmModels) -> Self {
        self.models = models;
        self
    }

    pub fn with_options(mut self, options: LlmOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generate with `model`, returning the parsed `response` JSON.
    ///
    /// Each attempt goes to the next endpoint in rotation.
    pub async fn generate(&self, task: &str, model: &str, prompt: &str) -> std::result::Result<Value, LlmFailure> {
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "format": "json",
            "options": self.options,
            "stream": false,
        });
        let operation = format!("llm_{}", task);

        let result = self
            .retry
            .run(&operation, |attempt| {
                let payload = &payload;
                async move {
                    let endpoint = self.endpoints.next().to_string();
                    let started = Instant::now();
                    let request_failed = |source| LlmFailure::Request {
                        endpoint: endpoint.clone(),
                        source,
                    };

                    let resp = self
                        .client
                        .post(format!("{}/api/generate", endpoint))
                        .json(payload)
                        .send()
                        .await
                        .map_err(request_failed)?;
                    info!(
                        "[LLM] {} status={} time={:.2}s ep={} attempt={}",
                        task,
                        resp.status().as_u16(),
                        started.elapsed().as_secs_f64(),
                        endpoint,
                        attempt
                    );
                    let text = resp
                        .error_for_status()
                        .map_err(request_failed)?
                        .text()
                        .await
                        .map_err(request_failed)?;
                    parse_generate_body(&text)
                }
            })
            .await;

        if let Err(e) = &result {
            error!("[LLM] {} failed after retries: {}", task, e);
        }
        result
    }

    /// Lists installed models on the first endpoint
    pub async fn ping(&self) -> Result<Value> {
        let url = format!("{}/api/tags", self.endpoints.first());
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(body)
    }
}

/// Read a non-streamed generate body and parse its `response` string.
pub fn parse_generate_body(text: &str) -> std::result::Result<Value, LlmFailure> {
    let envelope = extract_json(text);
    let response = envelope
        .get("response")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("{}");
    Ok(serde_json::from_str(response)?)
}

#[async_trait]
impl RecordNormalizer for OllamaClient {
    async fn normalize(&self, record: &Record) -> anyhow::Result<Record> {
        let prompt = render_prompt(&self.prompts.customer, record);
        match self.generate("normalize", &self.models.normalize, &prompt).await? {
            Value::Object(object) => Ok(Record::from_object(object)),
            other => anyhow::bail!("model returned a non-object record: {}", other),
        }
    }
}

#[async_trait]
impl AddressParser for OllamaClient {
    async fn parse_address(&self, record: &Record) -> anyhow::Result<AddressFields> {
        let prompt = render_prompt(&self.prompts.address, record);
        let output = self.generate("address", &self.models.address, &prompt).await?;
        Ok(match output {
            Value::Object(object) => address_from_object(&object),
            _ => AddressFields::empty(),
        })
    }
}

/// Tolerant field extraction from a model-produced object
pub fn address_from_object(object: &Map<String, Value>) -> AddressFields {
    let text = |field: &str| match object.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let postal_code = text("postal_code").map(|code| {
        if EIGHT_DIGITS.is_match(&code) {
            format_eight_digit_code(&code).unwrap_or(code)
        } else {
            code
        }
    });

    AddressFields {
        thoroughfare: text("thoroughfare"),
        house_number: text("house_number"),
        neighborhood: text("neighborhood"),
        city: text("city"),
        state: text("state"),
        postal_code,
        country_code: text("country_code").map(|c| c.to_uppercase()),
        complement: text("complement"),
    }
}
