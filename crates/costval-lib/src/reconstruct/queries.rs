//! Queries issued during reconstruction
//!
//! Instantaneous quantities are averaged over the window with
//! `avg_over_time` and evaluated at the window's end; liveness is an outer
//! subquery so that each unit comes back as a matrix of observations.

use super::aggregation::ResourceKind;
use super::interval::Window;
use crate::query::{format_duration, QuerySpec};
use chrono::Duration;

/// Labels identifying a container
pub const CONTAINER_LABELS: [&str; 3] = ["container", "pod", "namespace"];

/// Label identifying a persistent volume
pub const VOLUME_LABEL: &str = "persistentvolume";

/// Per-container running observations across the window
pub fn pod_liveness(namespace: &str, window: &Window, resolution: Duration) -> QuerySpec {
    QuerySpec::new("kube_pod_container_status_running")
        .with_filter("namespace", namespace)
        .not_equal_to(0)
        .with_function("avg")
        .group_by(CONTAINER_LABELS)
        .aggregate_window(format_duration(window.duration()))
        .aggregate_resolution(format_duration(resolution))
        .eval_at(window.end())
}

/// Average declared request per container
pub fn requested_average(kind: ResourceKind, namespace: &str, window: &Window) -> QuerySpec {
    let (resource, unit) = match kind {
        ResourceKind::Cpu => ("cpu", "core"),
        ResourceKind::Ram => ("memory", "byte"),
        ResourceKind::Gpu => ("nvidia_com_gpu", "integer"),
    };
    averaged("kube_pod_container_resource_requests", namespace, window)
        .with_filter("resource", resource)
        .with_filter("unit", unit)
}

/// Average quantity the cost model committed per container
pub fn allocated(kind: ResourceKind, namespace: &str, window: &Window) -> QuerySpec {
    let metric = match kind {
        ResourceKind::Cpu => "container_cpu_allocation",
        ResourceKind::Ram => "container_memory_allocation_bytes",
        ResourceKind::Gpu => "container_gpu_allocation",
    };
    averaged(metric, namespace, window)
}

/// Average observed usage per container, where the runtime exposes one
pub fn usage_average(kind: ResourceKind, namespace: &str, window: &Window) -> Option<QuerySpec> {
    match kind {
        ResourceKind::Cpu => Some(
            QuerySpec::new("container_cpu_usage_seconds_total")
                .with_filter("namespace", namespace)
                .with_ignore("container", "")
                .with_ignore("container", "POD")
                .window(format_duration(window.duration()))
                .with_function("rate")
                .with_function("sum")
                .group_by(CONTAINER_LABELS)
                .eval_at(window.end()),
        ),
        ResourceKind::Ram => Some(averaged(
            "container_memory_working_set_bytes",
            namespace,
            window,
        )),
        ResourceKind::Gpu => None,
    }
}

/// Provisioned capacity per persistent volume across the window
pub fn volume_capacity(window: &Window, resolution: Duration) -> QuerySpec {
    QuerySpec::new("kube_persistentvolume_capacity_bytes")
        .with_function("avg")
        .group_by([VOLUME_LABEL])
        .aggregate_window(format_duration(window.duration()))
        .aggregate_resolution(format_duration(resolution))
        .eval_at(window.end())
}

fn averaged(metric: &str, namespace: &str, window: &Window) -> QuerySpec {
    QuerySpec::new(metric)
        .with_filter("namespace", namespace)
        .with_ignore("container", "")
        .with_ignore("container", "POD")
        .window(format_duration(window.duration()))
        .with_function("avg_over_time")
        .with_function("avg")
        .group_by(CONTAINER_LABELS)
        .eval_at(window.end())
}
