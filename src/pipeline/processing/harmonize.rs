use crate::app::ports::Harmonizer;
use crate::domain::{Harmonization, Record};

/// Harmonization placeholder: emits the envelope with no code or unit mappings
#[derive(Debug, Clone, Default)]
pub struct PassthroughHarmonizer;

impl Harmonizer for PassthroughHarmonizer {
    fn harmonize(&self, _golden: Option<&Record>) -> Harmonization {
        Harmonization::default()
    }
}
