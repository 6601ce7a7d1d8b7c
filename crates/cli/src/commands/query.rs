//! Offline query compilation

use anyhow::Result;
use costval_lib::QuerySpec;
use serde::Serialize;

use crate::output::{print_heading, OutputFormat};

/// Options gathered from the `query` subcommand
#[derive(Debug, Default)]
pub struct QueryOptions {
    pub metric: String,
    pub filters: Vec<(String, String)>,
    pub ignore: Vec<(String, String)>,
    pub not_equal: Option<String>,
    pub functions: Vec<String>,
    pub group_by: Vec<String>,
    pub window: Option<String>,
    pub resolution: Option<String>,
    pub aggregate_window: Option<String>,
    pub aggregate_resolution: Option<String>,
    pub time: Option<i64>,
}

#[derive(Serialize)]
struct CompiledQuery {
    query: String,
    url: String,
}

/// Parse a `label=value` pair; the value may be empty
pub fn parse_label_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((label, value)) if !label.is_empty() => Ok((label.to_string(), value.to_string())),
        _ => Err(format!("expected label=value, got '{raw}'")),
    }
}

impl QueryOptions {
    pub fn to_spec(&self) -> QuerySpec {
        let mut spec = QuerySpec::new(&self.metric);

        for (label, value) in &self.filters {
            spec = spec.with_filter(label, value);
        }
        for (label, value) in &self.ignore {
            spec = spec.with_ignore(label, value);
        }
        if let Some(value) = &self.not_equal {
            spec = spec.not_equal_to(value);
        }
        for function in &self.functions {
            spec = spec.with_function(function);
        }
        if !self.group_by.is_empty() {
            spec = spec.group_by(&self.group_by);
        }
        if let Some(window) = &self.window {
            spec = spec.window(window);
        }
        if let Some(resolution) = &self.resolution {
            spec = spec.resolution(resolution);
        }
        if let Some(window) = &self.aggregate_window {
            spec = spec.aggregate_window(window);
        }
        if let Some(resolution) = &self.aggregate_resolution {
            spec = spec.aggregate_resolution(resolution);
        }
        if let Some(time) = self.time {
            spec = spec.eval_time(time);
        }
        spec
    }
}

/// Compile a query and print it with its request URL
pub fn show_query(options: &QueryOptions, base_url: &str, format: OutputFormat) -> Result<()> {
    let spec = options.to_spec();
    let compiled = CompiledQuery {
        query: spec.render()?,
        url: spec.to_url(base_url)?,
    };

    match format {
        OutputFormat::Json => {
            crate::output::print_json(&compiled)?;
        }
        OutputFormat::Table => {
            print_heading("Query");
            println!("{}", compiled.query);
            println!();
            print_heading("URL");
            println!("{}", compiled.url);
        }
    }

    Ok(())
}
