//! Tolerance-based comparison of reconstructed and reported quantities
//!
//! Independently sampled metrics and a continuously aggregating cost engine
//! never agree bit-for-bit, so quantities are compared by percentage
//! difference with a small absolute floor.

use crate::allocation::Allocation;
use crate::reconstruct::NamespaceAggregate;
use serde::Serialize;

/// Default accepted percentage difference
pub const DEFAULT_TOLERANCE_PERCENT: f64 = 5.0;

/// Default absolute difference below which values always match
pub const DEFAULT_ABSOLUTE_FLOOR: f64 = 1e-3;

/// Percentage difference relative to the larger magnitude
///
/// Zero when both values are zero.
pub fn percent_difference(reconstructed: f64, reported: f64) -> f64 {
    let scale = reconstructed.abs().max(reported.abs());
    if scale == 0.0 {
        return 0.0;
    }
    (reconstructed - reported).abs() / scale * 100.0
}

/// Acceptance bounds for one comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerance {
    pub percent: f64,
    pub absolute_floor: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            percent: DEFAULT_TOLERANCE_PERCENT,
            absolute_floor: DEFAULT_ABSOLUTE_FLOOR,
        }
    }
}

impl Tolerance {
    pub fn new(percent: f64) -> Self {
        Self {
            percent,
            ..Self::default()
        }
    }

    pub fn with_absolute_floor(mut self, floor: f64) -> Self {
        self.absolute_floor = floor;
        self
    }

    pub fn accepts(&self, reconstructed: f64, reported: f64) -> bool {
        if (reconstructed - reported).abs() <= self.absolute_floor {
            return true;
        }
        percent_difference(reconstructed, reported) <= self.percent
    }
}

/// Outcome of comparing one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldComparison {
    pub field: String,
    pub reconstructed: f64,
    pub reported: f64,
    pub percent_diff: f64,
    pub passed: bool,
}

impl FieldComparison {
    pub fn new(
        field: impl Into<String>,
        reconstructed: f64,
        reported: f64,
        tolerance: &Tolerance,
    ) -> Self {
        Self {
            field: field.into(),
            reconstructed,
            reported,
            percent_diff: percent_difference(reconstructed, reported),
            passed: tolerance.accepts(reconstructed, reported),
        }
    }
}

/// Field-by-field comparison for one namespace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceComparison {
    pub namespace: String,
    pub fields: Vec<FieldComparison>,
}

impl NamespaceComparison {
    pub fn passed(&self) -> bool {
        self.fields.iter().all(|f| f.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FieldComparison> {
        self.fields.iter().filter(|f| !f.passed)
    }
}

/// Compare a reconstructed namespace with the allocation API's figures
pub fn compare_namespace(
    aggregate: &NamespaceAggregate,
    allocation: &Allocation,
    tolerance: &Tolerance,
) -> NamespaceComparison {
    let pairs = [
        ("minutes", aggregate.minutes(), allocation.minutes),
        ("cpuCoreHours", aggregate.cpu_core_hours(), allocation.cpu_core_hours),
        (
            "cpuCoreRequestAverage",
            aggregate.cpu.request.average().unwrap_or(0.0),
            allocation.cpu_core_request_average,
        ),
        (
            "cpuCoreUsageAverage",
            aggregate.cpu.usage.average().unwrap_or(0.0),
            allocation.cpu_core_usage_average,
        ),
        ("ramByteHours", aggregate.ram_byte_hours(), allocation.ram_byte_hours),
        (
            "ramByteRequestAverage",
            aggregate.ram.request.average().unwrap_or(0.0),
            allocation.ram_byte_request_average,
        ),
        (
            "ramByteUsageAverage",
            aggregate.ram.usage.average().unwrap_or(0.0),
            allocation.ram_byte_usage_average,
        ),
        ("gpuHours", aggregate.gpu_hours(), allocation.gpu_hours),
    ];

    NamespaceComparison {
        namespace: aggregate.namespace.clone(),
        fields: pairs
            .into_iter()
            .map(|(field, reconstructed, reported)| {
                FieldComparison::new(field, reconstructed, reported, tolerance)
            })
            .collect(),
    }
}
