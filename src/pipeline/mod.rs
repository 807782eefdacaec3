// Batch processing: stage execution, lookup coalescing and the coordinator that sequences them

pub mod coordinator;
pub mod executor;
pub mod lookup;
pub mod pipeline_config;
pub mod processing;

pub use coordinator::{Collaborators, PipelineCoordinator, StageConcurrency};
pub use executor::{IssueLog, StageExecutor, StageItem};
pub use pipeline_config::{PipelinePlan, StageConfig};
