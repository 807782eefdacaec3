use std::sync::Arc;
use tracing::debug;

use crate::common::constants::{FIELD_COUNTRY_CODE, FIELD_POSTAL_CODE};
use crate::domain::{LookupKey, Record};
use crate::pipeline::lookup::LookupCache;

/// Attaches a resolved postal address to a record's `_parsed` slot
pub struct PostalEnrichUseCase {
    cache: Arc<LookupCache>,
}

impl PostalEnrichUseCase {
    pub fn new(cache: Arc<LookupCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Lookup key for a record, if its postal code is usable
    pub fn lookup_key(record: &Record) -> Option<LookupKey> {
        let raw = record.get_str(FIELD_POSTAL_CODE)?;
        LookupKey::parse(raw, record.get_str(FIELD_COUNTRY_CODE))
    }

    /// Resolve the record's postal code and attach the result.
    ///
    /// Records without a usable code, or whose lookup finds nothing, come back unchanged.
    pub async fn enrich_record(&self, mut record: Record) -> Record {
        let Some(key) = Self::lookup_key(&record) else {
            debug!(record_id = ?record.id, "no resolvable postal code");
            return record;
        };
        let resolved = self.cache.resolve(&key).await;
        if !resolved.is_empty() {
            record.parsed = Some(resolved);
        }
        record
    }
}
