// Default pure collaborators run once over the resolved batch

pub mod dedupe;
pub mod enrich;
pub mod golden;
pub mod harmonize;

pub use dedupe::{token_set_similarity, TokenSetDeduper};
pub use enrich::LocalityEnricher;
pub use golden::CompletenessGoldenPicker;
pub use harmonize::PassthroughHarmonizer;
