//! Metrics engine access
//!
//! Response envelope types for the instant-query endpoint, their normalized
//! [`SampleSeries`] form, and an HTTP client implementing [`MetricsSource`].

mod client;
mod response;

pub use client::PrometheusClient;
pub use response::{
    timestamp_to_datetime, MatrixSeries, QueryData, QueryResponse, RawSample, SampleSeries,
    VectorSeries,
};

use crate::error::Result;
use crate::query::QuerySpec;

pub use async_trait::async_trait;

/// Anything that can answer a [`QuerySpec`] with time-stamped samples
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Execute the query and return the materialized result
    async fn query(&self, spec: &QuerySpec) -> Result<QueryData>;
}
