//! Hierarchical aggregation of container quantities into pods and namespaces
//!
//! Hour-denominated quantities (core-hours, byte-hours) already encode
//! duration and are summed directly. Averages are intensive: they are
//! denormalized to `average * minutes`, summed, and renormalized by the
//! minutes of the union interval (see [`TimeWeightedAverage`]).

use super::interval::ResourceInterval;
use crate::error::CostvalError;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Kinds of resource a container is charged for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Ram,
    Gpu,
}

impl ResourceKind {
    pub const ALL: [Self; 3] = [Self::Cpu, Self::Ram, Self::Gpu];

    /// Unit of an instantaneous quantity
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Cpu => "cores",
            Self::Ram => "bytes",
            Self::Gpu => "gpus",
        }
    }

    /// Unit of the hour-denominated quantity
    pub fn hours_unit(&self) -> &'static str {
        match self {
            Self::Cpu => "core-hours",
            Self::Ram => "byte-hours",
            Self::Gpu => "gpu-hours",
        }
    }
}

/// Quantities reported for one resource kind of one container
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceQuantities {
    /// Average request over the pod's lifetime
    pub requested_average: Option<f64>,
    /// Average observed usage over the pod's lifetime
    pub usage_average: Option<f64>,
    /// Quantity the cost model committed to the container
    pub allocated: Option<f64>,
}

impl ResourceQuantities {
    /// The charged quantity: the greater of allocated and requested
    ///
    /// A container reporting only one of the two is charged for that one.
    /// Non-finite values count as absent.
    pub fn committed(&self) -> Option<f64> {
        let allocated = self.allocated.filter(|v| v.is_finite());
        let requested = self.requested_average.filter(|v| v.is_finite());
        match (allocated, requested) {
            (Some(allocated), Some(requested)) => Some(allocated.max(requested)),
            (allocated, requested) => allocated.or(requested),
        }
    }

    /// Hour-denominated quantity over `interval`
    pub fn hours(&self, interval: &ResourceInterval) -> f64 {
        if interval.is_degenerate() {
            return 0.0;
        }
        self.committed().unwrap_or(0.0) * interval.hours()
    }
}

/// Per-container scratch state, owned by its [`PodData`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContainerResourceData {
    pub cpu: ResourceQuantities,
    pub ram: ResourceQuantities,
    pub gpu: ResourceQuantities,
}

impl ContainerResourceData {
    pub fn get(&self, kind: ResourceKind) -> &ResourceQuantities {
        match kind {
            ResourceKind::Cpu => &self.cpu,
            ResourceKind::Ram => &self.ram,
            ResourceKind::Gpu => &self.gpu,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut ResourceQuantities {
        match kind {
            ResourceKind::Cpu => &mut self.cpu,
            ResourceKind::Ram => &mut self.ram,
            ResourceKind::Gpu => &mut self.gpu,
        }
    }

    pub fn core_hours(&self, interval: &ResourceInterval) -> f64 {
        self.cpu.hours(interval)
    }

    pub fn byte_hours(&self, interval: &ResourceInterval) -> f64 {
        self.ram.hours(interval)
    }

    pub fn gpu_hours(&self, interval: &ResourceInterval) -> f64 {
        self.gpu.hours(interval)
    }
}

/// An average weighted by the minutes it covers
///
/// Merging is associative and commutative: totals add and intervals union.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeWeightedAverage {
    raw_total: f64,
    interval: Option<ResourceInterval>,
}

impl TimeWeightedAverage {
    /// Denormalize `average` over `interval`
    pub fn new(average: f64, interval: ResourceInterval) -> Self {
        Self {
            raw_total: average * interval.minutes(),
            interval: Some(interval),
        }
    }

    pub fn merge(&self, other: &Self) -> Self {
        let interval = match (self.interval, other.interval) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        Self {
            raw_total: self.raw_total + other.raw_total,
            interval,
        }
    }

    pub fn merge_all<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
    {
        items
            .into_iter()
            .fold(Self::default(), |acc, item| acc.merge(item))
    }

    /// Sum of `average * minutes` over everything merged
    pub fn raw_total(&self) -> f64 {
        self.raw_total
    }

    pub fn interval(&self) -> Option<ResourceInterval> {
        self.interval
    }

    pub fn minutes(&self) -> f64 {
        self.interval.map(|i| i.minutes()).unwrap_or(0.0)
    }

    /// Renormalized average; `None` over a zero-minute union
    pub fn average(&self) -> Option<f64> {
        let minutes = self.minutes();
        if minutes <= 0.0 {
            return None;
        }
        Some(self.raw_total / minutes)
    }
}

/// A pod's lifetime and its containers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodData {
    pub namespace: String,
    pub name: String,
    pub interval: ResourceInterval,
    pub containers: BTreeMap<String, ContainerResourceData>,
}

impl PodData {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        interval: ResourceInterval,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            interval,
            containers: BTreeMap::new(),
        }
    }

    /// Widen the pod's lifetime with another observation
    pub fn observe(&mut self, interval: &ResourceInterval) {
        self.interval.widen(interval);
    }

    pub fn container_mut(&mut self, name: &str) -> &mut ContainerResourceData {
        self.containers.entry(name.to_string()).or_default()
    }

    pub fn minutes(&self) -> f64 {
        self.interval.minutes()
    }

    /// Sum of container hour quantities; zero for a degenerate lifetime
    pub fn resource_hours(&self, kind: ResourceKind) -> f64 {
        self.containers
            .values()
            .map(|c| c.get(kind).hours(&self.interval))
            .sum()
    }

    pub fn core_hours(&self) -> f64 {
        self.resource_hours(ResourceKind::Cpu)
    }

    pub fn byte_hours(&self) -> f64 {
        self.resource_hours(ResourceKind::Ram)
    }

    pub fn gpu_hours(&self) -> f64 {
        self.resource_hours(ResourceKind::Gpu)
    }

    /// Pod request average, weighted by the pod's lifetime
    pub fn request_average(&self, kind: ResourceKind) -> Option<TimeWeightedAverage> {
        self.weighted(kind, |q| q.requested_average)
    }

    /// Pod usage average, weighted by the pod's lifetime
    pub fn usage_average(&self, kind: ResourceKind) -> Option<TimeWeightedAverage> {
        self.weighted(kind, |q| q.usage_average)
    }

    // Containers share the pod's interval, so their averages add directly.
    fn weighted<F>(&self, kind: ResourceKind, field: F) -> Option<TimeWeightedAverage>
    where
        F: Fn(&ResourceQuantities) -> Option<f64>,
    {
        if self.interval.is_degenerate() {
            return None;
        }
        let values: Vec<f64> = self
            .containers
            .values()
            .filter_map(|c| field(c.get(kind)))
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(TimeWeightedAverage::new(values.iter().sum(), self.interval))
    }
}

/// Totals for one resource kind across many pods
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KindTotals {
    pub hours: f64,
    pub request: TimeWeightedAverage,
    pub usage: TimeWeightedAverage,
}

impl KindTotals {
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            hours: self.hours + other.hours,
            request: self.request.merge(&other.request),
            usage: self.usage.merge(&other.usage),
        }
    }
}

/// Final rollup for one namespace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceAggregate {
    pub namespace: String,
    /// Union of all non-degenerate pod lifetimes
    pub interval: Option<ResourceInterval>,
    pub pod_count: usize,
    pub container_count: usize,
    /// Pods excluded from hour aggregation for lack of run time
    pub degenerate_pods: usize,
    pub cpu: KindTotals,
    pub ram: KindTotals,
    pub gpu: KindTotals,
}

impl NamespaceAggregate {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            interval: None,
            pod_count: 0,
            container_count: 0,
            degenerate_pods: 0,
            cpu: KindTotals::default(),
            ram: KindTotals::default(),
            gpu: KindTotals::default(),
        }
    }

    pub fn from_pods<'a, I>(namespace: impl Into<String>, pods: I) -> Self
    where
        I: IntoIterator<Item = &'a PodData>,
    {
        let mut aggregate = Self::new(namespace);
        for pod in pods {
            aggregate.add_pod(pod);
        }
        aggregate
    }

    /// Fold one pod into the rollup
    pub fn add_pod(&mut self, pod: &PodData) {
        self.pod_count += 1;
        self.container_count += pod.containers.len();

        if pod.interval.is_degenerate() {
            let error = CostvalError::DegenerateInterval {
                unit: format!("{}/{}", pod.namespace, pod.name),
                minutes: pod.minutes(),
            };
            warn!(
                event = "degenerate_interval",
                error = %error,
                "Pod has no run time, excluding from hour aggregation"
            );
            self.degenerate_pods += 1;
            return;
        }

        self.interval = Some(match self.interval {
            Some(interval) => interval.union(&pod.interval),
            None => pod.interval,
        });

        for kind in ResourceKind::ALL {
            let totals = self.totals_mut(kind);
            totals.hours += pod.resource_hours(kind);
            if let Some(request) = pod.request_average(kind) {
                totals.request = totals.request.merge(&request);
            }
            if let Some(usage) = pod.usage_average(kind) {
                totals.usage = totals.usage.merge(&usage);
            }
        }
    }

    /// Combine two rollups, e.g. partial results for the same namespace
    pub fn merge(&self, other: &Self) -> Self {
        let interval = match (self.interval, other.interval) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        Self {
            namespace: self.namespace.clone(),
            interval,
            pod_count: self.pod_count + other.pod_count,
            container_count: self.container_count + other.container_count,
            degenerate_pods: self.degenerate_pods + other.degenerate_pods,
            cpu: self.cpu.merge(&other.cpu),
            ram: self.ram.merge(&other.ram),
            gpu: self.gpu.merge(&other.gpu),
        }
    }

    pub fn totals(&self, kind: ResourceKind) -> &KindTotals {
        match kind {
            ResourceKind::Cpu => &self.cpu,
            ResourceKind::Ram => &self.ram,
            ResourceKind::Gpu => &self.gpu,
        }
    }

    fn totals_mut(&mut self, kind: ResourceKind) -> &mut KindTotals {
        match kind {
            ResourceKind::Cpu => &mut self.cpu,
            ResourceKind::Ram => &mut self.ram,
            ResourceKind::Gpu => &mut self.gpu,
        }
    }

    pub fn minutes(&self) -> f64 {
        self.interval.map(|i| i.minutes()).unwrap_or(0.0)
    }

    pub fn cpu_core_hours(&self) -> f64 {
        self.cpu.hours
    }

    pub fn ram_byte_hours(&self) -> f64 {
        self.ram.hours
    }

    pub fn gpu_hours(&self) -> f64 {
        self.gpu.hours
    }
}

/// A persistent volume's lifetime and provisioned capacity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistentVolumeData {
    pub name: String,
    pub interval: ResourceInterval,
    pub capacity_bytes: f64,
}

impl PersistentVolumeData {
    pub fn byte_hours(&self) -> f64 {
        if self.interval.is_degenerate() {
            return 0.0;
        }
        self.capacity_bytes * self.interval.hours()
    }
}
