//! Metrics for the migration pipeline
//!
//! Stage helpers record through the `metrics` facade. When a Prometheus recorder is
//! installed with [`init`], [`render`] returns the text exposition so a run can leave
//! it behind for a textfile collector.

use std::fmt;
use std::sync::OnceLock;
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    SourceRecordsRead,
    SourceReadErrors,
    NormalizeRecordsProcessed,
    DedupeRecordsKept,
    DedupeRecordsSkipped,
    LoadRowsInserted,
    LoadChunksFailed,
    LoadChunkDuration,
    ExportArtifactsWritten,
    RunsCompleted,
    RunsAborted,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourceRecordsRead => "service_sync_source_records_read_total",
            MetricName::SourceReadErrors => "service_sync_source_read_errors_total",
            MetricName::NormalizeRecordsProcessed => "service_sync_normalize_records_processed_total",
            MetricName::DedupeRecordsKept => "service_sync_dedupe_records_kept_total",
            MetricName::DedupeRecordsSkipped => "service_sync_dedupe_records_skipped_total",
            MetricName::LoadRowsInserted => "service_sync_load_rows_inserted_total",
            MetricName::LoadChunksFailed => "service_sync_load_chunks_failed_total",
            MetricName::LoadChunkDuration => "service_sync_load_chunk_duration_seconds",
            MetricName::ExportArtifactsWritten => "service_sync_export_artifacts_written_total",
            MetricName::RunsCompleted => "service_sync_runs_completed_total",
            MetricName::RunsAborted => "service_sync_runs_aborted_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics recorder installed");
    Ok(())
}

/// Rendered text exposition, if a recorder was installed.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

pub mod source {
    use super::MetricName;

    pub fn records_read(count: usize) {
        ::metrics::counter!(MetricName::SourceRecordsRead.as_str()).increment(count as u64);
    }

    pub fn read_error() {
        ::metrics::counter!(MetricName::SourceReadErrors.as_str()).increment(1);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn records_processed(count: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsProcessed.as_str()).increment(count as u64);
    }
}

pub mod dedupe {
    use super::MetricName;

    pub fn records_kept(count: usize) {
        ::metrics::counter!(MetricName::DedupeRecordsKept.as_str()).increment(count as u64);
    }

    pub fn records_skipped(reason: &str, count: usize) {
        ::metrics::counter!(MetricName::DedupeRecordsSkipped.as_str(), "reason" => reason.to_string())
            .increment(count as u64);
    }
}

pub mod load {
    use super::MetricName;

    pub fn rows_inserted(count: usize) {
        ::metrics::counter!(MetricName::LoadRowsInserted.as_str()).increment(count as u64);
    }

    pub fn chunk_failed() {
        ::metrics::counter!(MetricName::LoadChunksFailed.as_str()).increment(1);
    }

    pub fn chunk_duration(secs: f64) {
        ::metrics::histogram!(MetricName::LoadChunkDuration.as_str()).record(secs);
    }
}

pub mod export {
    use super::MetricName;

    pub fn artifact_written(kind: &str) {
        ::metrics::counter!(MetricName::ExportArtifactsWritten.as_str(), "kind" => kind.to_string())
            .increment(1);
    }
}

pub mod run {
    use super::MetricName;

    pub fn completed() {
        ::metrics::counter!(MetricName::RunsCompleted.as_str()).increment(1);
    }

    pub fn aborted(state: &str) {
        ::metrics::counter!(MetricName::RunsAborted.as_str(), "state" => state.to_string()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_prometheus_conventions() {
        let names = [
            MetricName::SourceRecordsRead,
            MetricName::LoadRowsInserted,
            MetricName::LoadChunkDuration,
            MetricName::RunsAborted,
        ];
        for name in names {
            let s = name.as_str();
            assert!(s.starts_with("service_sync_"));
            assert!(s.ends_with("_total") || s.ends_with("_seconds"), "{s}");
        }
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        load::rows_inserted(3);
        dedupe::records_skipped("already_migrated", 1);
    }
}
