use async_trait::async_trait;
use serde_json::Value;

use crate::common::error::LookupFailure;
use crate::domain::{AddressFields, Harmonization, LookupKey, LookupResult, MatchCandidate, Record};

// Lookup-side ports

/// One source of postal lookups. Implementations perform a single attempt;
/// retry and fallback live in the provider chain.
#[async_trait]
pub trait LookupProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this provider can answer for the key's region
    fn supports(&self, key: &LookupKey) -> bool;

    async fn lookup(&self, key: &LookupKey) -> Result<LookupResult, LookupFailure>;
}

// LLM-backed stage ports

#[async_trait]
pub trait RecordNormalizer: Send + Sync {
    async fn normalize(&self, record: &Record) -> anyhow::Result<Record>;
}

#[async_trait]
pub trait AddressParser: Send + Sync {
    async fn parse_address(&self, record: &Record) -> anyhow::Result<AddressFields>;
}

// Pure collaborators, invoked once over the resolved batch

pub trait Deduper: Send + Sync {
    fn candidates(&self, records: &[Record]) -> Vec<MatchCandidate>;
}

pub trait GoldenPicker: Send + Sync {
    fn pick(&self, records: &[Record]) -> Option<Record>;
}

pub trait Harmonizer: Send + Sync {
    fn harmonize(&self, golden: Option<&Record>) -> Harmonization;
}

pub trait Enricher: Send + Sync {
    fn enrich(&self, records: &[Record]) -> Vec<Value>;
}
