//! Namespace reconstruction from raw metrics

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use colored::Colorize;
use costval_lib::prometheus::PrometheusClient;
use costval_lib::reconstruct::{
    reconstruct_persistent_volumes, NamespaceAggregate, NamespaceReconstructor,
    PersistentVolumeData, PodData, Reconstruction, ResourceKind, Window,
};
use serde::Serialize;
use tabled::Tabled;

use crate::config::ValidatorConfig;
use crate::output::{
    format_bytes, format_optional, format_quantity, print_heading, print_json, print_table,
    print_warning, OutputFormat,
};

/// Row for the per-pod table
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Containers")]
    containers: usize,
    #[tabled(rename = "Minutes")]
    minutes: String,
    #[tabled(rename = "CPU core-hours")]
    core_hours: String,
    #[tabled(rename = "RAM byte-hours")]
    byte_hours: String,
    #[tabled(rename = "GPU hours")]
    gpu_hours: String,
}

impl From<&PodData> for PodRow {
    fn from(pod: &PodData) -> Self {
        Self {
            pod: pod.name.clone(),
            containers: pod.containers.len(),
            minutes: format!("{:.1}", pod.minutes()),
            core_hours: format_quantity(pod.core_hours()),
            byte_hours: format_bytes(pod.byte_hours()),
            gpu_hours: format_quantity(pod.gpu_hours()),
        }
    }
}

/// Row for the persistent volume table
#[derive(Tabled)]
struct VolumeRow {
    #[tabled(rename = "Volume")]
    name: String,
    #[tabled(rename = "Capacity")]
    capacity: String,
    #[tabled(rename = "Minutes")]
    minutes: String,
    #[tabled(rename = "Byte-hours")]
    byte_hours: String,
}

#[derive(Serialize)]
struct ReconstructOutput<'a> {
    window: &'a Window,
    #[serde(flatten)]
    reconstruction: &'a Reconstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    persistent_volumes: Option<&'a [PersistentVolumeData]>,
}

/// Build the metrics client from configuration
pub fn metrics_client(config: &ValidatorConfig) -> Result<PrometheusClient> {
    PrometheusClient::with_timeout(&config.prometheus_url, config.request_timeout())
        .context("Invalid metrics engine URL")
}

/// Window of `duration` ending now
pub fn window_ending_now(duration: Duration) -> Result<Window> {
    Window::ending_at(Utc::now(), duration).context("Invalid window")
}

/// Reconstruct `namespace` over `window`
pub async fn reconstruct_window(
    client: &PrometheusClient,
    namespace: &str,
    window: Window,
    resolution: Duration,
) -> Result<Reconstruction> {
    NamespaceReconstructor::new(client, namespace, window)
        .with_resolution(resolution)
        .reconstruct()
        .await
        .with_context(|| format!("Failed to reconstruct namespace '{namespace}'"))
}

/// Show reconstructed quantities for a namespace
pub async fn show_reconstruction(
    config: &ValidatorConfig,
    namespace: &str,
    window: Option<&str>,
    resolution: Option<&str>,
    volumes: bool,
    format: OutputFormat,
) -> Result<()> {
    let client = metrics_client(config)?;
    let resolution = config.resolution_or(resolution)?;
    let window = window_ending_now(config.window_or(window)?)?;
    let reconstruction = reconstruct_window(&client, namespace, window, resolution).await?;

    let persistent_volumes = if volumes {
        let (volumes, report) =
            reconstruct_persistent_volumes(&client, &window, resolution, Utc::now()).await?;
        if !report.is_clean() {
            print_warning(&format!(
                "Skipped {} volume series, {} malformed samples",
                report.skipped_series, report.malformed_samples
            ));
        }
        Some(volumes)
    } else {
        None
    };

    match format {
        OutputFormat::Json => print_json(&ReconstructOutput {
            window: &window,
            reconstruction: &reconstruction,
            persistent_volumes: persistent_volumes.as_deref(),
        })?,
        OutputFormat::Table => {
            print_heading(&format!("Namespace {}", namespace.cyan()));
            println!(
                "Window:                 {} .. {}",
                window.start().to_rfc3339(),
                window.end().to_rfc3339()
            );
            println!();

            print_table(
                reconstruction.pods.iter().map(PodRow::from).collect(),
                "No running pods found",
            );
            println!();
            print_aggregate(&reconstruction.aggregate);

            let report = &reconstruction.report;
            if !report.is_clean() {
                println!();
                print_warning(&format!(
                    "Skipped {} unlabelled series, {} malformed samples, {} unmatched series; {} units had no run time",
                    report.skipped_series,
                    report.malformed_samples,
                    report.unmatched_series,
                    report.degenerate_units
                ));
            }

            if let Some(volumes) = persistent_volumes {
                println!();
                print_heading("Persistent Volumes");
                print_table(
                    volumes
                        .iter()
                        .map(|pv| VolumeRow {
                            name: pv.name.clone(),
                            capacity: format_bytes(pv.capacity_bytes),
                            minutes: format!("{:.1}", pv.interval.minutes()),
                            byte_hours: format_bytes(pv.byte_hours()),
                        })
                        .collect(),
                    "No persistent volumes found",
                );
            }
        }
    }

    Ok(())
}

fn print_aggregate(aggregate: &NamespaceAggregate) {
    println!("{}", "Namespace Totals".bold());
    println!("{}", "-".repeat(50));
    println!(
        "Pods:                   {} ({} containers)",
        aggregate.pod_count, aggregate.container_count
    );
    println!("Minutes:                {:.1}", aggregate.minutes());

    for kind in ResourceKind::ALL {
        let totals = aggregate.totals(kind);
        let render = |value: f64| match kind {
            ResourceKind::Ram => format_bytes(value),
            _ => format_quantity(value),
        };
        println!(
            "{:<24}{} {} (request avg {}, usage avg {})",
            format!("{kind:?}:"),
            render(totals.hours),
            kind.hours_unit(),
            format_optional(totals.request.average(), render),
            format_optional(totals.usage.average(), render),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_ending_now() {
        let window = window_ending_now(Duration::hours(24)).unwrap();
        assert_eq!(window.duration(), Duration::hours(24));
        assert!(window.end() <= Utc::now());

        let huge = costval_lib::parse_duration("100000000y").unwrap();
        assert!(window_ending_now(huge).is_err());
    }
}
