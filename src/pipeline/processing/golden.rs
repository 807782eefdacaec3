use crate::app::ports::GoldenPicker;
use crate::domain::{is_blank, Record};

const TRUSTED_SOURCES: [&str; 2] = ["ERP", "CRM"];
const TRUSTED_SOURCE_BONUS: usize = 5;

/// Picks the most complete record (trusted sources first) and fills its gaps from the others
#[derive(Debug, Clone, Default)]
pub struct CompletenessGoldenPicker;

impl CompletenessGoldenPicker {
    fn score(record: &Record) -> usize {
        let bonus = match record.get_str("source") {
            Some(s) if TRUSTED_SOURCES.contains(&s) => TRUSTED_SOURCE_BONUS,
            _ => 0,
        };
        bonus + record.filled_field_count()
    }
}

impl GoldenPicker for CompletenessGoldenPicker {
    fn pick(&self, records: &[Record]) -> Option<Record> {
        // first record wins ties
        let best = records
            .iter()
            .fold(None::<(&Record, usize)>, |best, r| {
                let s = Self::score(r);
                match best {
                    Some((_, top)) if top >= s => best,
                    _ => Some((r, s)),
                }
            })?
            .0;

        let mut gold = best.clone();
        for record in records {
            for (key, value) in &record.fields {
                if is_blank(value) {
                    continue;
                }
                let missing = gold.fields.get(key).map_or(true, is_blank);
                if missing {
                    gold.fields.insert(key.clone(), value.clone());
                }
            }
            if gold.id.is_none() {
                gold.id.clone_from(&record.id);
            }
            if gold.parsed.is_none() {
                gold.parsed.clone_from(&record.parsed);
            }
        }
        Some(gold)
    }
}
