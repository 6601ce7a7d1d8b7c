//! Instant-query response envelope

use crate::error::{CostvalError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response for /api/v1/query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: String, // "success" or "error"
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "errorType", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl QueryResponse {
    /// Unwrap the payload, mapping an error envelope to [`CostvalError::QueryFailed`]
    pub fn into_data(self) -> Result<QueryData> {
        if self.status != "success" {
            return Err(CostvalError::QueryFailed {
                error_type: self.error_type.unwrap_or_else(|| "unknown".to_string()),
                message: self.error.unwrap_or_else(|| format!("status {}", self.status)),
            });
        }
        self.data
            .ok_or_else(|| CostvalError::Decode("success response without data".to_string()))
    }
}

/// Query payload, tagged by `resultType`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryData {
    Vector(Vec<VectorSeries>),
    Matrix(Vec<MatrixSeries>),
    Scalar(RawSample),
    String(RawSample),
}

impl QueryData {
    /// Normalize into one [`SampleSeries`] per result entry
    pub fn into_series(self) -> Vec<SampleSeries> {
        match self {
            Self::Vector(series) => series
                .into_iter()
                .map(|s| SampleSeries {
                    labels: s.metric,
                    samples: vec![s.value],
                })
                .collect(),
            Self::Matrix(series) => series
                .into_iter()
                .map(|s| SampleSeries {
                    labels: s.metric,
                    samples: s.values,
                })
                .collect(),
            Self::Scalar(sample) | Self::String(sample) => vec![SampleSeries {
                labels: BTreeMap::new(),
                samples: vec![sample],
            }],
        }
    }

    pub fn result_type(&self) -> &'static str {
        match self {
            Self::Vector(_) => "vector",
            Self::Matrix(_) => "matrix",
            Self::Scalar(_) => "scalar",
            Self::String(_) => "string",
        }
    }
}

/// One entry of a vector result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSeries {
    pub metric: BTreeMap<String, String>,
    pub value: RawSample,
}

/// One entry of a matrix result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSeries {
    pub metric: BTreeMap<String, String>,
    pub values: Vec<RawSample>,
}

/// A `[timestamp, "value"]` pair as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, String)", into = "(f64, String)")]
pub struct RawSample {
    pub timestamp: f64,
    pub value: String,
}

impl From<(f64, String)> for RawSample {
    fn from((timestamp, value): (f64, String)) -> Self {
        Self { timestamp, value }
    }
}

impl From<RawSample> for (f64, String) {
    fn from(sample: RawSample) -> Self {
        (sample.timestamp, sample.value)
    }
}

impl RawSample {
    pub fn new(timestamp: f64, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// Parse the decimal string value
    pub fn parse_value(&self) -> Result<f64> {
        self.value
            .trim()
            .parse::<f64>()
            .map_err(|_| CostvalError::MalformedSample {
                timestamp: self.timestamp,
                value: self.value.clone(),
            })
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        timestamp_to_datetime(self.timestamp)
    }
}

/// Convert fractional Unix seconds to a UTC instant, at millisecond precision
pub fn timestamp_to_datetime(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((timestamp * 1000.0).round() as i64)
        .single()
}

/// One labelled time series, normalized from a vector or matrix result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSeries {
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<RawSample>,
}

impl SampleSeries {
    pub fn new(labels: BTreeMap<String, String>, samples: Vec<RawSample>) -> Self {
        Self { labels, samples }
    }

    /// Label value, treating an empty string as missing
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
