//! Declarative query specification and its rendering

use super::duration::parse_duration;
use crate::error::{CostvalError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// Path of the instant-query endpoint, relative to the engine's base URL
pub const QUERY_PATH: &str = "/api/v1/query";

/// Declarative description of one metrics query
///
/// Functions apply innermost-to-outermost: the first entry wraps the series
/// selector, each later entry wraps the previous result. The `by (...)` clause
/// attaches to the outermost call in the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    metric: String,
    filters: BTreeMap<String, String>,
    ignore_filters: BTreeMap<String, BTreeSet<String>>,
    not_equal_to: Option<String>,
    functions: Vec<String>,
    group_by: Vec<String>,
    window: Option<String>,
    resolution: Option<String>,
    aggregate_window: Option<String>,
    aggregate_resolution: Option<String>,
    eval_time: Option<i64>,
}

impl QuerySpec {
    /// Start a spec for the given metric
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            ..Self::default()
        }
    }

    /// Require `label` to equal `value`
    pub fn with_filter(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(label.into(), value.into());
        self
    }

    /// Exclude series whose `label` equals `value`
    pub fn with_ignore(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.ignore_filters
            .entry(label.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// Keep only samples whose raw value differs from `value`
    pub fn not_equal_to(mut self, value: impl Display) -> Self {
        self.not_equal_to = Some(value.to_string());
        self
    }

    /// Wrap the current expression in `function(...)`
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.functions.push(function.into());
        self
    }

    /// Set the labels of the outermost `by (...)` clause
    pub fn group_by<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Range applied to the series selector, before any function
    pub fn window(mut self, window: impl Into<String>) -> Self {
        self.window = Some(window.into());
        self
    }

    /// Subquery resolution for the selector range
    pub fn resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    /// Subquery range applied after the outermost function and grouping
    pub fn aggregate_window(mut self, window: impl Into<String>) -> Self {
        self.aggregate_window = Some(window.into());
        self
    }

    /// Resolution of the outer subquery
    pub fn aggregate_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.aggregate_resolution = Some(resolution.into());
        self
    }

    /// Evaluate the query at a Unix timestamp (seconds)
    pub fn eval_time(mut self, unix_seconds: i64) -> Self {
        self.eval_time = Some(unix_seconds);
        self
    }

    /// Evaluate the query at the given instant
    pub fn eval_at(self, at: DateTime<Utc>) -> Self {
        self.eval_time(at.timestamp())
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn evaluation_time(&self) -> Option<i64> {
        self.eval_time
    }

    /// Exact-match value required for `label`, if any
    pub fn filter(&self, label: &str) -> Option<&str> {
        self.filters.get(label).map(String::as_str)
    }

    /// Check builder preconditions
    pub fn validate(&self) -> Result<()> {
        if self.metric.trim().is_empty() {
            return Err(invalid("metric name is empty"));
        }
        if self.resolution.is_some() && self.window.is_none() {
            return Err(invalid("resolution requires a window"));
        }
        if self.aggregate_resolution.is_some() && self.aggregate_window.is_none() {
            return Err(invalid("aggregate resolution requires an aggregate window"));
        }
        if self.not_equal_to.is_some() && self.window.is_some() && self.resolution.is_none() {
            return Err(invalid(
                "a range selector needs a bare series; set a resolution to form a subquery",
            ));
        }
        if !self.group_by.is_empty() && self.functions.is_empty() {
            return Err(invalid("group-by labels require an aggregation function"));
        }

        let durations = [
            &self.window,
            &self.resolution,
            &self.aggregate_window,
            &self.aggregate_resolution,
        ];
        for duration in durations.into_iter().flatten() {
            parse_duration(duration).map_err(|e| invalid(&e.to_string()))?;
        }

        Ok(())
    }

    /// Render the query string understood by the metrics engine
    pub fn render(&self) -> Result<String> {
        self.validate()?;

        let mut matchers = Vec::with_capacity(self.filters.len() + self.ignore_filters.len());
        for (label, value) in &self.filters {
            matchers.push(format!("{label}=\"{}\"", escape_label_value(value)));
        }
        for (label, values) in &self.ignore_filters {
            for value in values {
                matchers.push(format!("{label}!=\"{}\"", escape_label_value(value)));
            }
        }

        let mut query = format!("{}{{{}}}", self.metric, matchers.join(", "));

        if let Some(value) = &self.not_equal_to {
            query = format!("{query} != {value}");
        }

        if let Some(window) = &self.window {
            let range = range_suffix(window, self.resolution.as_deref());
            query = if self.not_equal_to.is_some() {
                format!("({query}){range}")
            } else {
                format!("{query}{range}")
            };
        }

        for function in &self.functions {
            query = format!("{function}({query})");
        }

        if !self.group_by.is_empty() {
            query = format!("{query} by ({})", self.group_by.join(", "));
        }

        if let Some(window) = &self.aggregate_window {
            let range = range_suffix(window, self.aggregate_resolution.as_deref());
            // A bare comparison must be parenthesised before a subquery.
            let bare_comparison =
                self.functions.is_empty() && self.not_equal_to.is_some() && self.window.is_none();
            query = if bare_comparison {
                format!("({query}){range}")
            } else {
                format!("{query}{range}")
            };
        }

        Ok(query)
    }

    /// Build the full instant-query URL against `base_url`
    pub fn to_url(&self, base_url: &str) -> Result<String> {
        let query = self.render()?;
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();

        let mut url = format!(
            "{}{QUERY_PATH}?query={encoded}",
            base_url.trim_end_matches('/')
        );
        if let Some(time) = self.eval_time {
            url.push_str(&format!("&time={time}"));
        }

        Ok(url)
    }
}

fn invalid(reason: &str) -> CostvalError {
    CostvalError::InvalidSpec(reason.to_string())
}

fn range_suffix(window: &str, resolution: Option<&str>) -> String {
    match resolution {
        Some(resolution) => format!("[{window}:{resolution}]"),
        None => format!("[{window}]"),
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
