//! Validation of the allocation API against reconstructed quantities

use anyhow::{Context, Result};
use colored::Colorize;
use costval_lib::allocation::AllocationClient;
use costval_lib::{
    compare_namespace, FieldComparison, NamespaceComparison, Tolerance, ValidationLogger,
};
use serde::Serialize;
use tabled::Tabled;

use super::reconstruct::{metrics_client, reconstruct_window, window_ending_now};
use crate::config::ValidatorConfig;
use crate::output::{
    color_result, format_percent, format_quantity, print_error, print_heading, print_info,
    print_json, print_success, print_table, OutputFormat,
};

/// Row for the field comparison table
#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Reconstructed")]
    reconstructed: String,
    #[tabled(rename = "Reported")]
    reported: String,
    #[tabled(rename = "Difference")]
    difference: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl From<&FieldComparison> for FieldRow {
    fn from(field: &FieldComparison) -> Self {
        Self {
            field: field.field.clone(),
            reconstructed: format_quantity(field.reconstructed),
            reported: format_quantity(field.reported),
            difference: format_percent(field.percent_diff),
            result: color_result(field.passed),
        }
    }
}

#[derive(Serialize)]
struct ValidationOutput<'a> {
    tolerance: &'a Tolerance,
    passed: bool,
    #[serde(flatten)]
    comparison: &'a NamespaceComparison,
}

/// Compare a namespace's reconstruction with the allocation API
///
/// Returns an error when any field falls outside the tolerance so the
/// process exits non-zero.
pub async fn validate_namespace(
    config: &ValidatorConfig,
    namespace: &str,
    window: Option<&str>,
    resolution: Option<&str>,
    tolerance_percent: Option<f64>,
    format: OutputFormat,
) -> Result<()> {
    let tolerance = Tolerance::new(tolerance_percent.unwrap_or(config.tolerance_percent));
    let logger = ValidationLogger::new(&config.prometheus_url);

    let metrics = metrics_client(config)?;
    let allocations =
        AllocationClient::with_timeout(&config.allocation_url, config.request_timeout())
            .context("Invalid allocation API URL")?;

    let window = window_ending_now(config.window_or(window)?)?;
    logger.log_run_started(namespace, &window);

    let reconstruction =
        reconstruct_window(&metrics, namespace, window, config.resolution_or(resolution)?).await?;
    logger.log_reconstruction_report(namespace, &reconstruction.report);

    let reported = allocations
        .allocation(&window, "namespace")
        .await
        .context("Failed to fetch allocation data")?;
    let Some(allocation) = reported.get(namespace) else {
        logger.log_missing_allocation(namespace);
        anyhow::bail!("Allocation API reported nothing for namespace '{namespace}'");
    };

    let comparison = compare_namespace(&reconstruction.aggregate, allocation, &tolerance);
    logger.log_comparison(&comparison);

    match format {
        OutputFormat::Json => print_json(&ValidationOutput {
            tolerance: &tolerance,
            passed: comparison.passed(),
            comparison: &comparison,
        })?,
        OutputFormat::Table => {
            print_heading(&format!("Validation of {}", namespace.cyan()));
            print_info(&format!(
                "Tolerance {} (absolute floor {})",
                format_percent(tolerance.percent),
                tolerance.absolute_floor
            ));
            print_table(
                comparison.fields.iter().map(FieldRow::from).collect(),
                "No fields compared",
            );
        }
    }

    let failures = comparison.failures().count();
    if failures > 0 {
        print_error(&format!(
            "{failures} of {} fields outside tolerance",
            comparison.fields.len()
        ));
        anyhow::bail!("Validation failed for namespace '{namespace}'");
    }

    print_success(&format!("All {} fields within tolerance", comparison.fields.len()));
    Ok(())
}
