use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::common::constants::{
    DEFAULT_MODEL, LOOKUP_MAX_ATTEMPTS, OLLAMA_DEFAULT_ENDPOINT, VIACEP_URL, ZIPCODEBASE_URL,
};
use crate::common::error::{PipelineError, Result};
use crate::infra::{LlmModels, LlmOptions};
use crate::pipeline::coordinator::StageConcurrency;
use crate::pipeline::lookup::{Limits, RetryPolicy};

pub const CONFIG_PATH_VAR: &str = "MDM_CONFIG";

/// Runtime settings: defaults, then an optional TOML file, then environment variables
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_host: String,
    pub app_port: u16,

    pub ollama_endpoints: Vec<String>,
    pub model_normalize: String,
    pub model_address: String,
    pub num_gpu: u32,
    pub num_batch: u32,
    pub num_ctx: u32,
    pub num_thread: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    /// Seconds
    pub request_timeout: u64,
    pub prompt_dir: Option<PathBuf>,

    pub log_level: String,
    pub prometheus_addr: Option<String>,

    pub concurrency_normalize: usize,
    pub concurrency_address: usize,
    pub concurrency_postal: usize,

    pub use_postal_lookup: bool,
    pub zipcodebase_key: String,
    pub zipcodebase_url: String,
    pub viacep_url: String,
    pub zipcodebase_max_concurrency: u32,
    /// Seconds
    pub zipcodebase_base_delay: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_host: "0.0.0.0".to_string(),
            app_port: 8001,
            ollama_endpoints: vec![OLLAMA_DEFAULT_ENDPOINT.to_string()],
            model_normalize: DEFAULT_MODEL.to_string(),
            model_address: DEFAULT_MODEL.to_string(),
            num_gpu: 22,
            num_batch: 512,
            num_ctx: 4096,
            num_thread: 16,
            temperature: 0.0,
            top_p: 1.0,
            top_k: 40,
            request_timeout: 180,
            prompt_dir: None,
            log_level: "INFO".to_string(),
            prometheus_addr: None,
            concurrency_normalize: 8,
            concurrency_address: 8,
            concurrency_postal: 8,
            use_postal_lookup: false,
            zipcodebase_key: String::new(),
            zipcodebase_url: ZIPCODEBASE_URL.to_string(),
            viacep_url: VIACEP_URL.to_string(),
            zipcodebase_max_concurrency: 4,
            zipcodebase_base_delay: 1.0,
        }
    }
}

impl Settings {
    /// Load from `path` (or `MDM_CONFIG`) when given, then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        let mut settings = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults plus environment only
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Override fields from variables visible through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("APP_HOST") {
            self.app_host = v;
        }
        if let Some(v) = var("APP_PORT") {
            self.app_port = parse_var("APP_PORT", &v)?;
        }
        if let Some(v) = var("OLLAMA_ENDPOINTS") {
            self.ollama_endpoints = v
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = var("MODEL_NORMALIZE") {
            self.model_normalize = v;
        }
        if let Some(v) = var("MODEL_ADDRESS") {
            self.model_address = v;
        }
        if let Some(v) = var("NUM_GPU") {
            self.num_gpu = parse_var("NUM_GPU", &v)?;
        }
        if let Some(v) = var("NUM_BATCH") {
            self.num_batch = parse_var("NUM_BATCH", &v)?;
        }
        if let Some(v) = var("NUM_CTX") {
            self.num_ctx = parse_var("NUM_CTX", &v)?;
        }
        if let Some(v) = var("NUM_THREAD") {
            self.num_thread = parse_var("NUM_THREAD", &v)?;
        }
        if let Some(v) = var("TEMPERATURE") {
            self.temperature = parse_var("TEMPERATURE", &v)?;
        }
        if let Some(v) = var("TOP_P") {
            self.top_p = parse_var("TOP_P", &v)?;
        }
        if let Some(v) = var("TOP_K") {
            self.top_k = parse_var("TOP_K", &v)?;
        }
        if let Some(v) = var("REQUEST_TIMEOUT") {
            self.request_timeout = parse_var("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = var("PROMPT_DIR") {
            self.prompt_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = var("PROMETHEUS_ADDR") {
            self.prometheus_addr = Some(v);
        }
        if let Some(v) = var("CONCURRENCY_NORMALIZE") {
            self.concurrency_normalize = parse_var("CONCURRENCY_NORMALIZE", &v)?;
        }
        if let Some(v) = var("CONCURRENCY_ADDRESS") {
            self.concurrency_address = parse_var("CONCURRENCY_ADDRESS", &v)?;
        }
        if let Some(v) = var("CONCURRENCY_POSTAL") {
            self.concurrency_postal = parse_var("CONCURRENCY_POSTAL", &v)?;
        }
        if let Some(v) = var("USE_POSTAL_LOOKUP") {
            self.use_postal_lookup = parse_flag("USE_POSTAL_LOOKUP", &v)?;
        }
        if let Some(v) = var("ZIPCODEBASE_KEY") {
            self.zipcodebase_key = v;
        }
        if let Some(v) = var("ZIPCODEBASE_URL") {
            self.zipcodebase_url = v;
        }
        if let Some(v) = var("VIACEP_URL") {
            self.viacep_url = v;
        }
        if let Some(v) = var("ZIPCODEBASE_MAX_CONCURRENCY") {
            self.zipcodebase_max_concurrency = parse_var("ZIPCODEBASE_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = var("ZIPCODEBASE_BASE_DELAY") {
            self.zipcodebase_base_delay = parse_var("ZIPCODEBASE_BASE_DELAY", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ollama_endpoints.iter().all(|e| e.trim().is_empty()) {
            return Err(PipelineError::Config("OLLAMA_ENDPOINTS must name at least one endpoint".into()));
        }
        for (name, value) in [
            ("CONCURRENCY_NORMALIZE", self.concurrency_normalize),
            ("CONCURRENCY_ADDRESS", self.concurrency_address),
            ("CONCURRENCY_POSTAL", self.concurrency_postal),
            ("ZIPCODEBASE_MAX_CONCURRENCY", self.zipcodebase_max_concurrency as usize),
        ] {
            if value == 0 {
                return Err(PipelineError::Config(format!("{} must be at least 1", name)));
            }
        }
        if !self.zipcodebase_base_delay.is_finite() || self.zipcodebase_base_delay < 0.0 {
            return Err(PipelineError::Config("ZIPCODEBASE_BASE_DELAY must be a non-negative number".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        parse_var("APP_HOST/APP_PORT", &format!("{}:{}", self.app_host, self.app_port))
    }

    pub fn prometheus_addr(&self) -> Result<Option<SocketAddr>> {
        self.prometheus_addr
            .as_deref()
            .map(|addr| parse_var("PROMETHEUS_ADDR", addr))
            .transpose()
    }

    pub fn llm_options(&self) -> LlmOptions {
        LlmOptions {
            num_ctx: self.num_ctx,
            num_batch: self.num_batch,
            num_gpu: self.num_gpu,
            num_thread: self.num_thread,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }

    pub fn llm_models(&self) -> LlmModels {
        LlmModels {
            normalize: self.model_normalize.clone(),
            address: self.model_address.clone(),
        }
    }

    pub fn stage_concurrency(&self) -> StageConcurrency {
        StageConcurrency {
            postal: self.concurrency_postal,
            normalize: self.concurrency_normalize,
            address: self.concurrency_address,
        }
    }

    pub fn lookup_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(LOOKUP_MAX_ATTEMPTS, Duration::from_secs_f64(self.zipcodebase_base_delay))
    }

    pub fn lookup_limits(&self) -> Limits {
        Limits::concurrency(self.zipcodebase_max_concurrency)
    }

    /// The primary provider is only configured with an API key
    pub fn has_zipcodebase_key(&self) -> bool {
        !self.zipcodebase_key.trim().is_empty()
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("invalid value for {}: '{}'", name, raw)))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::Config(format!("invalid flag for {}: '{}'", name, raw))),
    }
}
