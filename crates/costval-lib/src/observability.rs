//! Structured logging for validation runs
//!
//! Every event carries an `event` field so runs can be filtered when the
//! JSON formatter is enabled.

use crate::compare::{FieldComparison, NamespaceComparison};
use crate::reconstruct::{ReconstructionReport, Window};
use tracing::{info, warn};

/// Structured logger for validation events
#[derive(Debug, Clone)]
pub struct ValidationLogger {
    metrics_endpoint: String,
}

impl ValidationLogger {
    pub fn new(metrics_endpoint: impl Into<String>) -> Self {
        Self {
            metrics_endpoint: metrics_endpoint.into(),
        }
    }

    /// Log the start of a run for one namespace
    pub fn log_run_started(&self, namespace: &str, window: &Window) {
        info!(
            event = "validation_started",
            metrics_endpoint = %self.metrics_endpoint,
            namespace = %namespace,
            window_start = %window.start(),
            window_end = %window.end(),
            "Validating namespace against raw metrics"
        );
    }

    /// Log reconstruction diagnostics; warns when anything was skipped
    pub fn log_reconstruction_report(&self, namespace: &str, report: &ReconstructionReport) {
        if report.is_clean() {
            info!(
                event = "reconstruction_report",
                namespace = %namespace,
                "Reconstruction used every series"
            );
        } else {
            warn!(
                event = "reconstruction_report",
                namespace = %namespace,
                malformed_samples = report.malformed_samples,
                skipped_series = report.skipped_series,
                unmatched_series = report.unmatched_series,
                degenerate_units = report.degenerate_units,
                "Reconstruction skipped some data"
            );
        }
    }

    /// Log one field comparison
    pub fn log_field_comparison(&self, namespace: &str, comparison: &FieldComparison) {
        if comparison.passed {
            info!(
                event = "field_compared",
                namespace = %namespace,
                field = %comparison.field,
                reconstructed = comparison.reconstructed,
                reported = comparison.reported,
                percent_diff = comparison.percent_diff,
                "Field within tolerance"
            );
        } else {
            warn!(
                event = "field_mismatch",
                namespace = %namespace,
                field = %comparison.field,
                reconstructed = comparison.reconstructed,
                reported = comparison.reported,
                percent_diff = comparison.percent_diff,
                "Field outside tolerance"
            );
        }
    }

    /// Log every field and the overall outcome of a namespace comparison
    pub fn log_comparison(&self, comparison: &NamespaceComparison) {
        for field in &comparison.fields {
            self.log_field_comparison(&comparison.namespace, field);
        }

        let failures = comparison.failures().count();
        if failures == 0 {
            info!(
                event = "validation_passed",
                namespace = %comparison.namespace,
                fields = comparison.fields.len(),
                "Namespace matches allocation API"
            );
        } else {
            warn!(
                event = "validation_failed",
                namespace = %comparison.namespace,
                fields = comparison.fields.len(),
                failures = failures,
                "Namespace differs from allocation API"
            );
        }
    }

    /// Log a namespace the allocation API did not report
    pub fn log_missing_allocation(&self, namespace: &str) {
        warn!(
            event = "allocation_missing",
            namespace = %namespace,
            "Allocation API reported nothing for namespace"
        );
    }
}
