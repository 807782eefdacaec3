pub mod ports;
pub mod postal_enrich_use_case;

pub use postal_enrich_use_case::PostalEnrichUseCase;
