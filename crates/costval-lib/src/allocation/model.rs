//! Allocation API response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Envelope returned by the allocation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationResponse {
    pub code: u16,
    #[serde(default)]
    pub data: Vec<BTreeMap<String, Allocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Cost and quantity figures for one aggregate (e.g. a namespace)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Allocation {
    pub name: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub minutes: f64,
    pub cpu_cores: f64,
    pub cpu_core_hours: f64,
    pub cpu_core_request_average: f64,
    pub cpu_core_usage_average: f64,
    pub cpu_cost: f64,
    pub gpu_count: f64,
    pub gpu_hours: f64,
    pub gpu_cost: f64,
    pub ram_bytes: f64,
    pub ram_byte_hours: f64,
    pub ram_byte_request_average: f64,
    pub ram_byte_usage_average: f64,
    pub ram_cost: f64,
    pub pv_byte_hours: f64,
    pub pv_cost: f64,
    pub total_cost: f64,
}
