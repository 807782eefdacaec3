use serde_json::{json, Value};

use crate::app::ports::Enricher;
use crate::domain::Record;

/// Reports the resolved locality of every record that has one
#[derive(Debug, Clone, Default)]
pub struct LocalityEnricher;

impl Enricher for LocalityEnricher {
    fn enrich(&self, records: &[Record]) -> Vec<Value> {
        records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let parsed = record.parsed.as_ref().filter(|p| !p.is_empty())?;
                Some(json!({
                    "index": index,
                    "id": record.id,
                    "city": parsed.city,
                    "state": parsed.state,
                    "postal_code": parsed.postal_code,
                    "country_code": parsed.country_code,
                }))
            })
            .collect()
    }
}
