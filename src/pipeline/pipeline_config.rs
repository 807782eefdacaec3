use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::common::constants::{
    STAGE_ADDRESS, STAGE_ENRICH, STAGE_GOLDEN, STAGE_HARMONIZE, STAGE_MATCH, STAGE_NORMALIZE, STAGE_POSTAL,
};
use crate::domain::Operation;

/// Stages the coordinator knows how to run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageConfig {
    Postal,
    Normalize,
    Address,
    Match,
    Golden,
    Harmonize,
    Enrich,
}

/// The stages selected for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub stages: Vec<StageConfig>,
}

impl PipelinePlan {
    /// Pick stages from the requested operations.
    ///
    /// Normalization, address parsing, duplicate scoring and harmonization
    /// always run. The golden record needs `consolidate` or `dedupe`,
    /// enrichment needs `enrich`, and the postal stage runs only when a
    /// lookup cache is wired in.
    pub fn for_operations(operations: &[Operation], postal_lookup: bool) -> Self {
        let wants = |op: Operation| operations.contains(&op);
        let mut stages = Vec::with_capacity(7);
        if postal_lookup {
            stages.push(StageConfig::Postal);
        }
        stages.extend([StageConfig::Normalize, StageConfig::Address, StageConfig::Match]);
        if wants(Operation::Consolidate) || wants(Operation::Dedupe) {
            stages.push(StageConfig::Golden);
        }
        stages.push(StageConfig::Harmonize);
        if wants(Operation::Enrich) {
            stages.push(StageConfig::Enrich);
        }
        Self { stages }
    }

    pub fn includes(&self, stage: StageConfig) -> bool {
        self.stages.contains(&stage)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(StageConfig::step_name).collect()
    }

    /// Validate stage ordering against declared dependencies
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(anyhow::anyhow!("Pipeline must have at least one stage"));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            for dep in stage.dependencies() {
                if !seen.contains(dep) {
                    return Err(anyhow::anyhow!(
                        "Stage '{}' depends on '{}' which does not run before it",
                        stage.step_name(),
                        dep
                    ));
                }
            }
            if !seen.insert(stage.step_name()) {
                return Err(anyhow::anyhow!("Stage '{}' appears twice", stage.step_name()));
            }
        }
        Ok(())
    }
}

impl StageConfig {
    pub fn step_name(&self) -> &'static str {
        match self {
            StageConfig::Postal => STAGE_POSTAL,
            StageConfig::Normalize => STAGE_NORMALIZE,
            StageConfig::Address => STAGE_ADDRESS,
            StageConfig::Match => STAGE_MATCH,
            StageConfig::Golden => STAGE_GOLDEN,
            StageConfig::Harmonize => STAGE_HARMONIZE,
            StageConfig::Enrich => STAGE_ENRICH,
        }
    }

    pub fn dependencies(&self) -> Vec<&'static str> {
        match self {
            StageConfig::Postal | StageConfig::Normalize => vec![],
            StageConfig::Address | StageConfig::Match | StageConfig::Golden | StageConfig::Enrich => {
                vec![STAGE_NORMALIZE]
            }
            StageConfig::Harmonize => vec![],
        }
    }

    /// I/O-bound stages go through the stage executor; the rest run once over the batch
    pub fn is_io_bound(&self) -> bool {
        matches!(self, StageConfig::Postal | StageConfig::Normalize | StageConfig::Address)
    }
}
