//! Metrics for the cleaning pipeline
//!
//! Recording goes through the `metrics` facade; nothing is exported until
//! [`init`] installs the Prometheus recorder, so library code and tests can
//! record freely without one.

use std::fmt;
use std::net::SocketAddr;
use tracing::info;

/// Every metric name used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Lookup metrics
    LookupCacheHits,
    LookupCoalescedWaits,
    LookupUpstreamCalls,
    LookupProviderAttempts,
    LookupRetriesScheduled,

    // Stage metrics
    StageRecordsProcessed,
    StageIssuesRecorded,
    StageDuration,

    // Batch metrics
    BatchesProcessed,
    BatchRecords,
    BatchIssues,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::LookupCacheHits => "mdm_lookup_cache_hits_total",
            MetricName::LookupCoalescedWaits => "mdm_lookup_coalesced_waits_total",
            MetricName::LookupUpstreamCalls => "mdm_lookup_upstream_calls_total",
            MetricName::LookupProviderAttempts => "mdm_lookup_provider_attempts_total",
            MetricName::LookupRetriesScheduled => "mdm_lookup_retries_scheduled_total",

            MetricName::StageRecordsProcessed => "mdm_stage_records_processed_total",
            MetricName::StageIssuesRecorded => "mdm_stage_issues_recorded_total",
            MetricName::StageDuration => "mdm_stage_duration_seconds",

            MetricName::BatchesProcessed => "mdm_batches_processed_total",
            MetricName::BatchRecords => "mdm_batch_records",
            MetricName::BatchIssues => "mdm_batch_issues",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            LookupCacheHits,
            LookupCoalescedWaits,
            LookupUpstreamCalls,
            LookupProviderAttempts,
            LookupRetriesScheduled,
            StageRecordsProcessed,
            StageIssuesRecorded,
            StageDuration,
            BatchesProcessed,
            BatchRecords,
            BatchIssues,
        ]
        .into_iter()
    }
}

/// Install the Prometheus recorder. With an address, also serve `/metrics` there.
pub fn init(listen: Option<SocketAddr>) -> Result<(), Box<dyn std::error::Error>> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    match listen {
        Some(addr) => {
            builder
                .with_http_listener(addr)
                .install()
                .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))?;
            info!(%addr, "Metrics exporter listening");
        }
        None => {
            builder
                .install_recorder()
                .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
            info!("Metrics system initialized (no exporter endpoint)");
        }
    }

    Ok(())
}

// ============================================================================
// Lookup Metrics
// ============================================================================

pub mod lookup {
    use super::MetricName;

    /// A lookup answered from the cache
    pub fn cache_hit() {
        ::metrics::counter!(MetricName::LookupCacheHits.as_str()).increment(1);
    }

    /// A caller attached to an in-flight lookup instead of calling upstream
    pub fn coalesced_wait() {
        ::metrics::counter!(MetricName::LookupCoalescedWaits.as_str()).increment(1);
    }

    /// A provider chain resolution was started
    pub fn upstream_call() {
        ::metrics::counter!(MetricName::LookupUpstreamCalls.as_str()).increment(1);
    }

    pub fn provider_attempt(provider: &'static str, outcome: &'static str) {
        ::metrics::counter!(
            MetricName::LookupProviderAttempts.as_str(),
            "provider" => provider,
            "outcome" => outcome
        )
        .increment(1);
    }

    pub fn retry_scheduled(operation: &str) {
        ::metrics::counter!(
            MetricName::LookupRetriesScheduled.as_str(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}

// ============================================================================
// Stage Metrics
// ============================================================================

pub mod stage {
    use super::MetricName;

    pub fn record_processed(stage: &str) {
        ::metrics::counter!(MetricName::StageRecordsProcessed.as_str(), "stage" => stage.to_string())
            .increment(1);
    }

    pub fn issue_recorded(stage: &str) {
        ::metrics::counter!(MetricName::StageIssuesRecorded.as_str(), "stage" => stage.to_string())
            .increment(1);
    }

    pub fn duration(stage: &str, secs: f64) {
        ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage.to_string())
            .record(secs);
    }
}

// ============================================================================
// Batch Metrics
// ============================================================================

pub mod batch {
    use super::MetricName;

    pub fn processed(records: usize, issues: usize) {
        ::metrics::counter!(MetricName::BatchesProcessed.as_str()).increment(1);
        ::metrics::histogram!(MetricName::BatchRecords.as_str()).record(records as f64);
        ::metrics::histogram!(MetricName::BatchIssues.as_str()).record(issues as f64);
    }
}
