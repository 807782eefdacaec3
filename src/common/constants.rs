/// Stage names used for issues, audit entries, metrics labels and log spans
pub const STAGE_POSTAL: &str = "postal";
pub const STAGE_NORMALIZE: &str = "normalize";
pub const STAGE_ADDRESS: &str = "address";
pub const STAGE_MATCH: &str = "match";
pub const STAGE_GOLDEN: &str = "golden";
pub const STAGE_HARMONIZE: &str = "harmonize";
pub const STAGE_ENRICH: &str = "enrich";

// Record fields the engine reads directly
pub const FIELD_POSTAL_CODE: &str = "cep";
pub const FIELD_COUNTRY_CODE: &str = "country_code";
pub const FIELD_ADDRESS: &str = "address";
pub const FIELD_EMAIL: &str = "email";

// Postal lookup
pub const DEFAULT_COUNTRY: &str = "BR";
pub const MIN_POSTAL_DIGITS: usize = 5;
pub const ZIPCODEBASE_URL: &str = "https://app.zipcodebase.com/api/v1/search";
pub const VIACEP_URL: &str = "https://viacep.com.br/ws";
pub const LOOKUP_MAX_ATTEMPTS: u32 = 3;
pub const LOOKUP_MAX_JITTER_SECS: f64 = 0.5;

// Provider timeouts (seconds)
pub const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const PROVIDER_REQUEST_TIMEOUT_SECS: u64 = 10;

// LLM
pub const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen2.5:7b";
pub const LLM_MAX_ATTEMPTS: u32 = 3;
pub const LLM_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const PROMPT_INPUT_PLACEHOLDER: &str = "{input_json}";

// Duplicate scoring
pub const MATCH_THRESHOLD: f64 = 0.87;

// Response confidence
pub const CONFIDENCE_WITH_GOLDEN: f64 = 0.9;
pub const CONFIDENCE_WITHOUT_GOLDEN: f64 = 0.7;
