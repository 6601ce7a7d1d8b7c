//! Resource reconstruction from raw time-series samples
//!
//! This module provides:
//! - Lifetime reconstruction for pods and volumes ([`calculate_start_and_end`])
//! - Container → pod → namespace aggregation with time-weighted averages
//! - A driver that issues the required queries and folds their results

mod aggregation;
mod interval;
mod namespace;
pub mod queries;

#[cfg(test)]
mod tests;

pub use aggregation::{
    ContainerResourceData, KindTotals, NamespaceAggregate, PersistentVolumeData, PodData,
    ResourceKind, ResourceQuantities, TimeWeightedAverage,
};
pub use interval::{calculate_start_and_end, ResourceInterval, Window};
pub use namespace::{
    reconstruct_persistent_volumes, NamespaceReconstructor, Reconstruction, ReconstructionReport,
    DEFAULT_RESOLUTION_MINUTES,
};
