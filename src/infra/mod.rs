// Adapters for the outside world: HTTP providers, the LLM server and helpers they share

pub mod endpoint_selector;
pub mod http_client;
pub mod json_text;
pub mod ollama;
pub mod viacep;
pub mod zipcodebase;

pub use endpoint_selector::RoundRobin;
pub use ollama::{LlmModels, LlmOptions, OllamaClient, PromptTemplates};
pub use viacep::ViaCepProvider;
pub use zipcodebase::ZipcodebaseProvider;
