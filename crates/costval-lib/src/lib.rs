//! Core library for validating cost-allocation output against raw metrics
//!
//! This crate provides:
//! - Query construction for the metrics engine's query language
//! - Metrics engine response model and HTTP client
//! - Reconstruction of pod/container lifetimes and resource quantities
//! - Hierarchical aggregation with time-weighted averages
//! - Allocation API client and tolerance-based comparison

pub mod allocation;
pub mod compare;
pub mod error;
pub mod observability;
pub mod prometheus;
pub mod query;
pub mod reconstruct;

pub use compare::{
    compare_namespace, percent_difference, FieldComparison, NamespaceComparison, Tolerance,
};
pub use error::{CostvalError, Result};
pub use observability::ValidationLogger;
pub use query::{format_duration, parse_duration, QuerySpec};
