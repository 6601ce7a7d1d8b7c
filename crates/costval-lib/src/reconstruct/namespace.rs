//! Namespace reconstruction from raw metrics
//!
//! Liveness, requested, allocated and usage queries are independent and are
//! issued concurrently. Reconciliation is ordered: pod lifetimes must exist
//! before averages can be turned into hour quantities.

use super::aggregation::{
    NamespaceAggregate, PersistentVolumeData, PodData, ResourceKind, ResourceQuantities,
};
use super::interval::{calculate_start_and_end, Window};
use super::queries;
use crate::error::{CostvalError, Result};
use crate::prometheus::{MetricsSource, QueryData, RawSample, SampleSeries};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Default sampling resolution for liveness subqueries
pub const DEFAULT_RESOLUTION_MINUTES: i64 = 5;

/// Diagnostics collected while reconstructing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconstructionReport {
    /// Sample values that failed to parse
    pub malformed_samples: usize,
    /// Series skipped for missing or empty identifying labels
    pub skipped_series: usize,
    /// Quantity series with no matching liveness data
    pub unmatched_series: usize,
    /// Units with zero run time after clamping
    pub degenerate_units: usize,
}

impl ReconstructionReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of reconstructing one namespace
#[derive(Debug, Clone, Serialize)]
pub struct Reconstruction {
    pub aggregate: NamespaceAggregate,
    pub pods: Vec<PodData>,
    pub report: ReconstructionReport,
}

/// Which field of [`ResourceQuantities`] a series fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Requested,
    Allocated,
    Usage,
}

impl Quantity {
    fn slot(self, quantities: &mut ResourceQuantities) -> &mut Option<f64> {
        match self {
            Self::Requested => &mut quantities.requested_average,
            Self::Allocated => &mut quantities.allocated,
            Self::Usage => &mut quantities.usage_average,
        }
    }
}

/// Reconstructs per-pod and per-namespace quantities for one namespace
pub struct NamespaceReconstructor<'a, S: MetricsSource + ?Sized> {
    source: &'a S,
    namespace: String,
    window: Window,
    resolution: Duration,
    now: DateTime<Utc>,
}

impl<'a, S: MetricsSource + ?Sized> NamespaceReconstructor<'a, S> {
    pub fn new(source: &'a S, namespace: impl Into<String>, window: Window) -> Self {
        Self {
            source,
            namespace: namespace.into(),
            window,
            resolution: Duration::minutes(DEFAULT_RESOLUTION_MINUTES),
            now: Utc::now(),
        }
    }

    pub fn with_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution;
        self
    }

    /// Override the wall-clock instant intervals are clamped to
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Issue all queries and fold the results into a [`Reconstruction`]
    pub async fn reconstruct(&self) -> Result<Reconstruction> {
        let ns = self.namespace.as_str();
        let window = &self.window;

        let liveness_spec = queries::pod_liveness(ns, window, self.resolution);
        let cpu_requested_spec = queries::requested_average(ResourceKind::Cpu, ns, window);
        let cpu_allocated_spec = queries::allocated(ResourceKind::Cpu, ns, window);
        let ram_requested_spec = queries::requested_average(ResourceKind::Ram, ns, window);
        let ram_allocated_spec = queries::allocated(ResourceKind::Ram, ns, window);
        let gpu_requested_spec = queries::requested_average(ResourceKind::Gpu, ns, window);
        let gpu_allocated_spec = queries::allocated(ResourceKind::Gpu, ns, window);

        info!(
            event = "reconstruction_started",
            namespace = %ns,
            window_start = %window.start(),
            window_end = %window.end(),
            "Querying metrics for namespace"
        );

        let (
            liveness,
            cpu_requested,
            cpu_allocated,
            ram_requested,
            ram_allocated,
            gpu_requested,
            gpu_allocated,
            cpu_usage,
            ram_usage,
        ) = tokio::try_join!(
            self.source.query(&liveness_spec),
            self.source.query(&cpu_requested_spec),
            self.source.query(&cpu_allocated_spec),
            self.source.query(&ram_requested_spec),
            self.source.query(&ram_allocated_spec),
            self.source.query(&gpu_requested_spec),
            self.source.query(&gpu_allocated_spec),
            self.optional_usage(ResourceKind::Cpu),
            self.optional_usage(ResourceKind::Ram),
        )?;

        let mut report = ReconstructionReport::default();
        let mut pods = self.build_pods(liveness, &mut report)?;

        let quantities = [
            (ResourceKind::Cpu, Quantity::Requested, Some(cpu_requested)),
            (ResourceKind::Cpu, Quantity::Allocated, Some(cpu_allocated)),
            (ResourceKind::Cpu, Quantity::Usage, cpu_usage),
            (ResourceKind::Ram, Quantity::Requested, Some(ram_requested)),
            (ResourceKind::Ram, Quantity::Allocated, Some(ram_allocated)),
            (ResourceKind::Ram, Quantity::Usage, ram_usage),
            (ResourceKind::Gpu, Quantity::Requested, Some(gpu_requested)),
            (ResourceKind::Gpu, Quantity::Allocated, Some(gpu_allocated)),
        ];
        for (kind, quantity, data) in quantities {
            if let Some(data) = data {
                attach(&mut pods, data, kind, quantity, &mut report);
            }
        }

        let pods: Vec<PodData> = pods.into_values().collect();
        let aggregate = NamespaceAggregate::from_pods(ns, &pods);
        report.degenerate_units += aggregate.degenerate_pods;

        info!(
            event = "reconstruction_finished",
            namespace = %ns,
            pods = aggregate.pod_count,
            containers = aggregate.container_count,
            cpu_core_hours = aggregate.cpu_core_hours(),
            ram_byte_hours = aggregate.ram_byte_hours(),
            malformed_samples = report.malformed_samples,
            skipped_series = report.skipped_series,
            "Namespace reconstructed"
        );

        Ok(Reconstruction {
            aggregate,
            pods,
            report,
        })
    }

    async fn optional_usage(&self, kind: ResourceKind) -> Result<Option<QueryData>> {
        match queries::usage_average(kind, &self.namespace, &self.window) {
            Some(spec) => self.source.query(&spec).await.map(Some),
            None => Ok(None),
        }
    }

    fn build_pods(
        &self,
        liveness: QueryData,
        report: &mut ReconstructionReport,
    ) -> Result<BTreeMap<(String, String), PodData>> {
        let mut pods: BTreeMap<(String, String), PodData> = BTreeMap::new();

        for series in liveness.into_series() {
            let Some((namespace, pod, container)) = container_key(&series) else {
                skip_unlabelled(&series, report);
                continue;
            };

            let valid = valid_samples(&series, report);
            if valid.is_empty() {
                warn!(
                    event = "series_skipped",
                    namespace,
                    pod,
                    container,
                    "No valid liveness samples, dropping container"
                );
                report.skipped_series += 1;
                continue;
            }

            let interval =
                match calculate_start_and_end(&valid, self.resolution, &self.window, self.now) {
                    Ok(interval) => interval,
                    Err(CostvalError::EmptySeries) => continue,
                    Err(e) => return Err(e),
                };

            pods.entry((namespace.to_string(), pod.to_string()))
                .and_modify(|p| p.observe(&interval))
                .or_insert_with(|| PodData::new(namespace, pod, interval))
                .container_mut(container);
        }

        Ok(pods)
    }
}

/// Reconstruct provisioned persistent volumes across the window
pub async fn reconstruct_persistent_volumes<S: MetricsSource + ?Sized>(
    source: &S,
    window: &Window,
    resolution: Duration,
    now: DateTime<Utc>,
) -> Result<(Vec<PersistentVolumeData>, ReconstructionReport)> {
    let data = source
        .query(&queries::volume_capacity(window, resolution))
        .await?;

    let mut report = ReconstructionReport::default();
    let mut volumes = Vec::new();

    for series in data.into_series() {
        let Some(name) = series.label(queries::VOLUME_LABEL) else {
            skip_unlabelled(&series, &mut report);
            continue;
        };

        let valid = valid_samples(&series, &mut report);
        let Some(capacity_bytes) = mean(&valid) else {
            continue;
        };
        let interval = calculate_start_and_end(&valid, resolution, window, now)?;
        if interval.is_degenerate() {
            let error = CostvalError::DegenerateInterval {
                unit: name.to_string(),
                minutes: interval.minutes(),
            };
            warn!(event = "degenerate_interval", error = %error, "Volume has no run time");
            report.degenerate_units += 1;
        }

        volumes.push(PersistentVolumeData {
            name: name.to_string(),
            interval,
            capacity_bytes,
        });
    }

    Ok((volumes, report))
}

fn attach(
    pods: &mut BTreeMap<(String, String), PodData>,
    data: QueryData,
    kind: ResourceKind,
    quantity: Quantity,
    report: &mut ReconstructionReport,
) {
    for series in data.into_series() {
        let Some((namespace, pod, container)) = container_key(&series) else {
            skip_unlabelled(&series, report);
            continue;
        };

        let valid = valid_samples(&series, report);
        let Some(value) = mean(&valid) else {
            continue;
        };

        let Some(pod_data) = pods.get_mut(&(namespace.to_string(), pod.to_string())) else {
            warn!(
                event = "unmatched_series",
                namespace,
                pod,
                container,
                resource = ?kind,
                "No liveness data for container, skipping"
            );
            report.unmatched_series += 1;
            continue;
        };

        *quantity.slot(pod_data.container_mut(container).get_mut(kind)) = Some(value);
    }
}

fn container_key(series: &SampleSeries) -> Option<(&str, &str, &str)> {
    Some((
        series.label("namespace")?,
        series.label("pod")?,
        series.label("container")?,
    ))
}

fn skip_unlabelled(series: &SampleSeries, report: &mut ReconstructionReport) {
    warn!(
        event = "series_skipped",
        labels = ?series.labels,
        "Series is missing identifying labels"
    );
    report.skipped_series += 1;
}

/// Samples with finite values; malformed, NaN and infinite ones are logged and counted
fn valid_samples(series: &SampleSeries, report: &mut ReconstructionReport) -> Vec<RawSample> {
    series
        .samples
        .iter()
        .filter(|sample| match sample.parse_value() {
            Ok(value) if value.is_finite() => true,
            Ok(value) => {
                warn!(
                    event = "non_finite_sample",
                    labels = ?series.labels,
                    timestamp = sample.timestamp,
                    value,
                    "Skipping sample"
                );
                report.malformed_samples += 1;
                false
            }
            Err(e) => {
                warn!(event = "malformed_sample", labels = ?series.labels, error = %e, "Skipping sample");
                report.malformed_samples += 1;
                false
            }
        })
        .cloned()
        .collect()
}

fn mean(samples: &[RawSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().filter_map(|s| s.parse_value().ok()).sum();
    Some(sum / samples.len() as f64)
}
