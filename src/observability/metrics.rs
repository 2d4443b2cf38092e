//! Metrics for the ETL pipeline
//!
//! Metrics are recorded through the `metrics` facade. The pipeline installs no
//! recorder of its own; an embedding process may install one, otherwise every
//! call is a no-op.

use std::fmt;
use std::time::Instant;

/// Enum representing all metric names used in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Load metrics
    LoadSuccess,
    LoadError,
    LoadRows,

    // Cleaning metrics
    CleanRowsOut,
    CleanCoercionFailures,
    CleanRowsFilteredOut,
    CleanRollupRowsRemoved,
    CleanRowsMerged,
    CleanDuration,

    // Validation metrics
    ValidationPassed,
    ValidationFailed,
    ValidationViolations,

    // Run metrics
    DatasetsDone,
    DatasetsFailed,
    RunDuration,

    // Export metrics
    ExportSuccess,
    ExportError,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::LoadSuccess => "etl_load_success_total",
            MetricName::LoadError => "etl_load_error_total",
            MetricName::LoadRows => "etl_load_rows",

            MetricName::CleanRowsOut => "etl_clean_rows_total",
            MetricName::CleanCoercionFailures => "etl_clean_coercion_failures_total",
            MetricName::CleanRowsFilteredOut => "etl_clean_rows_filtered_out_total",
            MetricName::CleanRollupRowsRemoved => "etl_clean_rollup_rows_removed_total",
            MetricName::CleanRowsMerged => "etl_clean_rows_merged_total",
            MetricName::CleanDuration => "etl_clean_duration_seconds",

            MetricName::ValidationPassed => "etl_validation_passed_total",
            MetricName::ValidationFailed => "etl_validation_failed_total",
            MetricName::ValidationViolations => "etl_validation_violations_total",

            MetricName::DatasetsDone => "etl_datasets_done_total",
            MetricName::DatasetsFailed => "etl_datasets_failed_total",
            MetricName::RunDuration => "etl_run_duration_seconds",

            MetricName::ExportSuccess => "etl_export_success_total",
            MetricName::ExportError => "etl_export_error_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            LoadSuccess,
            LoadError,
            LoadRows,
            CleanRowsOut,
            CleanCoercionFailures,
            CleanRowsFilteredOut,
            CleanRollupRowsRemoved,
            CleanRowsMerged,
            CleanDuration,
            ValidationPassed,
            ValidationFailed,
            ValidationViolations,
            DatasetsDone,
            DatasetsFailed,
            RunDuration,
            ExportSuccess,
            ExportError,
        ]
        .into_iter()
    }

    /// Returns (phase, description, unit)
    pub fn metadata(&self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            MetricName::LoadSuccess => ("load", "Raw frames loaded", None),
            MetricName::LoadError => ("load", "Raw frame load failures", None),
            MetricName::LoadRows => ("load", "Rows per raw frame", None),

            MetricName::CleanRowsOut => ("clean", "Rows in cleaned frames", None),
            MetricName::CleanCoercionFailures => ("clean", "Cells that failed type coercion", None),
            MetricName::CleanRowsFilteredOut => ("clean", "Rows outside the county scope", None),
            MetricName::CleanRollupRowsRemoved => ("clean", "Rollup rows removed", None),
            MetricName::CleanRowsMerged => ("clean", "Rows merged by de-duplication", None),
            MetricName::CleanDuration => ("clean", "Cleaning duration", Some("s")),

            MetricName::ValidationPassed => ("validate", "Datasets passing validation", None),
            MetricName::ValidationFailed => ("validate", "Datasets failing validation", None),
            MetricName::ValidationViolations => ("validate", "Violating cells", None),

            MetricName::DatasetsDone => ("run", "Datasets that reached DONE", None),
            MetricName::DatasetsFailed => ("run", "Datasets that reached FAILED", None),
            MetricName::RunDuration => ("run", "Batch duration", Some("s")),

            MetricName::ExportSuccess => ("export", "Successful exporter runs", None),
            MetricName::ExportError => ("export", "Failed exporter runs", None),
        }
    }
}

/// Records elapsed seconds into a histogram when dropped
pub struct TimingGuard {
    start: Instant,
    histogram: MetricName,
    dataset: Option<String>,
}

impl TimingGuard {
    pub fn new(histogram: MetricName) -> Self {
        Self {
            start: Instant::now(),
            histogram,
            dataset: None,
        }
    }

    pub fn with_dataset(mut self, dataset: &str) -> Self {
        self.dataset = Some(dataset.to_string());
        self
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let secs = self.start.elapsed().as_secs_f64();
        match self.dataset.take() {
            Some(dataset) => ::metrics::histogram!(self.histogram.as_str(), "dataset" => dataset).record(secs),
            None => ::metrics::histogram!(self.histogram.as_str()).record(secs),
        }
    }
}

pub fn time_operation(histogram: MetricName) -> TimingGuard {
    TimingGuard::new(histogram)
}

// ============================================================================
// Load Metrics
// ============================================================================

pub mod load {
    use super::MetricName;

    pub fn success(dataset: &str, rows: usize) {
        ::metrics::counter!(MetricName::LoadSuccess.as_str(), "dataset" => dataset.to_string()).increment(1);
        ::metrics::histogram!(MetricName::LoadRows.as_str(), "dataset" => dataset.to_string()).record(rows as f64);
    }

    pub fn error(dataset: &str) {
        ::metrics::counter!(MetricName::LoadError.as_str(), "dataset" => dataset.to_string()).increment(1);
    }
}

// ============================================================================
// Cleaning Metrics
// ============================================================================

pub mod clean {
    use super::MetricName;

    pub fn rows_out(dataset: &str, rows: usize) {
        ::metrics::counter!(MetricName::CleanRowsOut.as_str(), "dataset" => dataset.to_string())
            .increment(rows as u64);
    }

    pub fn coercion_failures(dataset: &str, count: usize) {
        if count > 0 {
            ::metrics::counter!(MetricName::CleanCoercionFailures.as_str(), "dataset" => dataset.to_string())
                .increment(count as u64);
        }
    }

    pub fn filtered_out(dataset: &str, count: usize) {
        if count > 0 {
            ::metrics::counter!(MetricName::CleanRowsFilteredOut.as_str(), "dataset" => dataset.to_string())
                .increment(count as u64);
        }
    }

    pub fn rollups_removed(dataset: &str, count: usize) {
        if count > 0 {
            ::metrics::counter!(MetricName::CleanRollupRowsRemoved.as_str(), "dataset" => dataset.to_string())
                .increment(count as u64);
        }
    }

    pub fn rows_merged(dataset: &str, count: usize) {
        if count > 0 {
            ::metrics::counter!(MetricName::CleanRowsMerged.as_str(), "dataset" => dataset.to_string())
                .increment(count as u64);
        }
    }
}

// ============================================================================
// Validation Metrics
// ============================================================================

pub mod validate {
    use super::MetricName;

    pub fn outcome(dataset: &str, passed: bool, violating_cells: usize) {
        let name = if passed {
            MetricName::ValidationPassed
        } else {
            MetricName::ValidationFailed
        };
        ::metrics::counter!(name.as_str(), "dataset" => dataset.to_string()).increment(1);
        if violating_cells > 0 {
            ::metrics::counter!(MetricName::ValidationViolations.as_str(), "dataset" => dataset.to_string())
                .increment(violating_cells as u64);
        }
    }
}

// ============================================================================
// Run Metrics
// ============================================================================

pub mod run {
    use super::MetricName;

    pub fn dataset_done(dataset: &str) {
        ::metrics::counter!(MetricName::DatasetsDone.as_str(), "dataset" => dataset.to_string()).increment(1);
    }

    pub fn dataset_failed(dataset: &str, stage: &str) {
        ::metrics::counter!(MetricName::DatasetsFailed.as_str(),
            "dataset" => dataset.to_string(),
            "stage" => stage.to_string()
        )
        .increment(1);
    }
}

// ============================================================================
// Export Metrics
// ============================================================================

pub mod export {
    use super::MetricName;

    pub fn success(exporter: &str) {
        ::metrics::counter!(MetricName::ExportSuccess.as_str(), "exporter" => exporter.to_string()).increment(1);
    }

    pub fn error(exporter: &str) {
        ::metrics::counter!(MetricName::ExportError.as_str(), "exporter" => exporter.to_string()).increment(1);
    }
}
