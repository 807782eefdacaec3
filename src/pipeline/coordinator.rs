use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::executor::{IssueLog, StageExecutor};
use super::pipeline_config::{PipelinePlan, StageConfig};
use super::processing::{CompletenessGoldenPicker, LocalityEnricher, PassthroughHarmonizer, TokenSetDeduper};
use crate::app::ports::{AddressParser, Deduper, Enricher, GoldenPicker, Harmonizer, RecordNormalizer};
use crate::app::PostalEnrichUseCase;
use crate::common::constants::{
    CONFIDENCE_WITHOUT_GOLDEN, CONFIDENCE_WITH_GOLDEN, FIELD_ADDRESS, FIELD_EMAIL, FIELD_POSTAL_CODE,
};
use crate::domain::{AuditEntry, BatchRequest, BatchResponse, Issue, Record};
use crate::observability::metrics;

/// Independent executor bounds for each I/O-bound stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageConcurrency {
    pub postal: usize,
    pub normalize: usize,
    pub address: usize,
}

impl StageConcurrency {
    /// Executor bound for an I/O-bound stage; batch-wide stages run once
    pub fn for_stage(&self, stage: StageConfig) -> usize {
        match stage {
            StageConfig::Postal => self.postal,
            StageConfig::Normalize => self.normalize,
            StageConfig::Address => self.address,
            _ => 1,
        }
    }
}

impl Default for StageConcurrency {
    fn default() -> Self {
        Self {
            postal: 8,
            normalize: 8,
            address: 8,
        }
    }
}

/// The computational collaborators, consumed as opaque functions over the resolved batch
pub struct Collaborators {
    pub deduper: Arc<dyn Deduper>,
    pub golden: Arc<dyn GoldenPicker>,
    pub harmonizer: Arc<dyn Harmonizer>,
    pub enricher: Arc<dyn Enricher>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            deduper: Arc::new(TokenSetDeduper::default()),
            golden: Arc::new(CompletenessGoldenPicker),
            harmonizer: Arc::new(PassthroughHarmonizer),
            enricher: Arc::new(LocalityEnricher),
        }
    }
}

/// Runs one batch through the stages its operations call for
pub struct PipelineCoordinator {
    normalizer: Arc<dyn RecordNormalizer>,
    address_parser: Arc<dyn AddressParser>,
    postal: Option<PostalEnrichUseCase>,
    concurrency: StageConcurrency,
    collaborators: Collaborators,
}

impl PipelineCoordinator {
    pub fn new(normalizer: Arc<dyn RecordNormalizer>, address_parser: Arc<dyn AddressParser>) -> Self {
        Self {
            normalizer,
            address_parser,
            postal: None,
            concurrency: StageConcurrency::default(),
            collaborators: Collaborators::default(),
        }
    }

    /// Enable the postal stage, backed by the given lookups
    pub fn with_postal_lookup(mut self, postal: PostalEnrichUseCase) -> Self {
        self.postal = Some(postal);
        self
    }

    pub fn with_concurrency(mut self, concurrency: StageConcurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn postal(&self) -> Option<&PostalEnrichUseCase> {
        self.postal.as_ref()
    }

    pub async fn process(&self, request: BatchRequest) -> BatchResponse {
        let batch_id = Uuid::new_v4();
        let span = info_span!("batch", %batch_id, domain = ?request.domain);
        self.process_batch(request).instrument(span).await
    }

    async fn process_batch(&self, request: BatchRequest) -> BatchResponse {
        let started = Instant::now();
        let plan = PipelinePlan::for_operations(&request.operations, self.postal.is_some());
        info!(
            "🚀 Processing {} records, operations={:?}, stages={:?}",
            request.records.len(),
            request.operations,
            plan.stage_names()
        );

        let issues = IssueLog::new();
        let executor = StageExecutor::new(issues.clone());
        let mut audit = Vec::new();
        let mut records = request.records;

        if let Err(e) = plan.validate() {
            warn!("⚠️ Rejecting batch: {}", e);
            issues.push(Issue::new("plan", None, e.to_string()));
            return BatchResponse {
                record_clean: records,
                issues: issues.snapshot(),
                confidence: CONFIDENCE_WITHOUT_GOLDEN,
                ..BatchResponse::default()
            };
        }

        for stage in plan.stages.iter().copied().filter(StageConfig::is_io_bound) {
            let stage_started = Instant::now();
            let bound = self.concurrency.for_stage(stage);
            records = match stage {
                StageConfig::Postal => {
                    let Some(postal) = self.postal.as_ref() else {
                        continue;
                    };
                    executor
                        .run(
                            stage.step_name(),
                            bound,
                            records,
                            move |record| async move { Ok::<_, anyhow::Error>(postal.enrich_record(record).await) },
                            |record| record,
                        )
                        .await
                }
                StageConfig::Normalize => {
                    let normalizer = self.normalizer.as_ref();
                    executor
                        .run(
                            stage.step_name(),
                            bound,
                            records,
                            move |record| async move { normalize_one(normalizer, record).await },
                            |record| record,
                        )
                        .await
                }
                StageConfig::Address => {
                    let parser = self.address_parser.as_ref();
                    executor
                        .run(
                            stage.step_name(),
                            bound,
                            records,
                            move |record| async move { parse_address_one(parser, record).await },
                            |record| record,
                        )
                        .await
                }
                _ => records,
            };
            audit.push(finish_stage(stage, records.len(), stage_started, started));
        }

        let collaborators = &self.collaborators;

        let stage_started = Instant::now();
        let matches = collaborators.deduper.candidates(&records);
        audit.push(finish_stage(StageConfig::Match, records.len(), stage_started, started));

        let golden = if plan.includes(StageConfig::Golden) {
            let stage_started = Instant::now();
            let golden = collaborators.golden.pick(&records);
            audit.push(finish_stage(StageConfig::Golden, records.len(), stage_started, started));
            golden
        } else {
            None
        };

        let harmonization = collaborators.harmonizer.harmonize(golden.as_ref());

        let enrichment = if plan.includes(StageConfig::Enrich) {
            let stage_started = Instant::now();
            let enrichment = collaborators.enricher.enrich(&records);
            audit.push(finish_stage(StageConfig::Enrich, records.len(), stage_started, started));
            enrichment
        } else {
            Vec::new()
        };

        let confidence = if golden.is_some() {
            CONFIDENCE_WITH_GOLDEN
        } else {
            CONFIDENCE_WITHOUT_GOLDEN
        };

        let issues = issues.snapshot();
        metrics::batch::processed(records.len(), issues.len());
        info!(
            "🎉 Batch done in {:.2}s: {} records, {} matches, {} issues",
            started.elapsed().as_secs_f64(),
            records.len(),
            matches.len(),
            issues.len()
        );

        BatchResponse {
            record_clean: records,
            golden_record: golden,
            matches,
            harmonization,
            enrichment,
            issues,
            audit_log: audit,
            confidence,
            ..BatchResponse::default()
        }
    }
}

async fn normalize_one(normalizer: &dyn RecordNormalizer, mut record: Record) -> anyhow::Result<Record> {
    if let Some(email) = record.get_str(FIELD_EMAIL).map(|e| e.trim().to_lowercase()) {
        record.set(FIELD_EMAIL, email);
    }
    let mut out = normalizer.normalize(&record).await?;
    // keep what the model is not responsible for
    if out.id.is_none() {
        out.id = record.id;
    }
    // a lookup-resolved address outranks whatever the model echoes back
    if let Some(mut resolved) = record.parsed {
        if let Some(echoed) = out.parsed.as_ref() {
            resolved.fill_missing_from(echoed);
        }
        out.parsed = Some(resolved);
    }
    Ok(out)
}

async fn parse_address_one(parser: &dyn AddressParser, mut record: Record) -> anyhow::Result<Record> {
    if record.get_str(FIELD_ADDRESS).is_none() && record.get_str(FIELD_POSTAL_CODE).is_none() {
        return Ok(record);
    }
    let guessed = parser.parse_address(&record).await?;
    match record.parsed.as_mut() {
        // lookup-resolved fields win; the model only fills gaps
        Some(resolved) => resolved.fill_missing_from(&guessed),
        None if !guessed.is_empty() => record.parsed = Some(guessed),
        None => {}
    }
    Ok(record)
}

fn finish_stage(stage: StageConfig, records: usize, stage_started: Instant, batch_started: Instant) -> AuditEntry {
    let elapsed = stage_started.elapsed();
    metrics::stage::duration(stage.step_name(), elapsed.as_secs_f64());
    info!(
        "✅ {} done in {:.2}s ({:.2}s into batch)",
        stage.step_name(),
        elapsed.as_secs_f64(),
        batch_started.elapsed().as_secs_f64()
    );
    AuditEntry {
        stage: stage.step_name().to_string(),
        records,
        elapsed_ms: elapsed.as_millis() as u64,
        finished_at: Utc::now(),
    }
}
