//! Cost validator CLI
//!
//! A command-line tool for compiling metrics queries, reconstructing
//! namespace resource usage from raw metrics, and validating the
//! allocation API's figures against that reconstruction.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::query::{parse_label_pair, QueryOptions};
use commands::{query, reconstruct, validate};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Cost validator CLI
#[derive(Parser)]
#[command(name = "costval")]
#[command(author, version, about = "Cost Validator: check cost allocations against raw metrics", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML); defaults to ~/.config/costval/config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Metrics engine URL (overrides config and COSTVAL_PROMETHEUS_URL)
    #[arg(long)]
    pub prometheus_url: Option<String>,

    /// Allocation API URL (overrides config and COSTVAL_ALLOCATION_URL)
    #[arg(long)]
    pub allocation_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a query and print its request URL
    Query {
        /// Metric name
        metric: String,

        /// Label equality matcher (label=value), repeatable
        #[arg(long = "filter", value_parser = parse_label_pair)]
        filters: Vec<(String, String)>,

        /// Label inequality matcher (label=value), repeatable
        #[arg(long, value_parser = parse_label_pair)]
        ignore: Vec<(String, String)>,

        /// Append a `!= VALUE` comparison
        #[arg(long)]
        not_equal: Option<String>,

        /// Function to wrap the expression in, innermost first; repeatable
        #[arg(long = "function")]
        functions: Vec<String>,

        /// Grouping labels for the outermost function
        #[arg(long = "by", value_delimiter = ',')]
        group_by: Vec<String>,

        /// Range applied to the selector (e.g. 1h)
        #[arg(long)]
        window: Option<String>,

        /// Subquery resolution for the selector range (e.g. 5m)
        #[arg(long)]
        resolution: Option<String>,

        /// Subquery range applied to the whole expression
        #[arg(long)]
        aggregate_window: Option<String>,

        /// Resolution of the outer subquery
        #[arg(long)]
        aggregate_resolution: Option<String>,

        /// Evaluation time (unix seconds)
        #[arg(long)]
        time: Option<i64>,
    },

    /// Reconstruct pod and namespace quantities from raw metrics
    Reconstruct {
        /// Namespace to reconstruct
        #[arg(long, short)]
        namespace: String,

        /// Lookback window (e.g. 24h, 7d)
        #[arg(long)]
        window: Option<String>,

        /// Liveness sampling resolution (e.g. 5m)
        #[arg(long)]
        resolution: Option<String>,

        /// Also reconstruct persistent volumes
        #[arg(long)]
        volumes: bool,
    },

    /// Compare the allocation API against a reconstruction
    Validate {
        /// Namespace to validate
        #[arg(long, short)]
        namespace: String,

        /// Lookback window (e.g. 24h, 7d)
        #[arg(long)]
        window: Option<String>,

        /// Liveness sampling resolution (e.g. 5m)
        #[arg(long)]
        resolution: Option<String>,

        /// Accepted percentage difference per field
        #[arg(long)]
        tolerance: Option<f64>,
    },
}

fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    // Load configuration
    let mut config = config::ValidatorConfig::load(cli.config.as_deref())?;
    config.apply_overrides(cli.prometheus_url, cli.allocation_url);
    debug!(
        prometheus_url = %config.prometheus_url,
        allocation_url = %config.allocation_url,
        window = %config.window,
        "Configuration loaded"
    );

    // Execute command
    match cli.command {
        Commands::Query {
            metric,
            filters,
            ignore,
            not_equal,
            functions,
            group_by,
            window,
            resolution,
            aggregate_window,
            aggregate_resolution,
            time,
        } => {
            let options = QueryOptions {
                metric,
                filters,
                ignore,
                not_equal,
                functions,
                group_by,
                window,
                resolution,
                aggregate_window,
                aggregate_resolution,
                time,
            };
            query::show_query(&options, &config.prometheus_url, cli.format)?;
        }
        Commands::Reconstruct {
            namespace,
            window,
            resolution,
            volumes,
        } => {
            reconstruct::show_reconstruction(
                &config,
                &namespace,
                window.as_deref(),
                resolution.as_deref(),
                volumes,
                cli.format,
            )
            .await?;
        }
        Commands::Validate {
            namespace,
            window,
            resolution,
            tolerance,
        } => {
            validate::validate_namespace(
                &config,
                &namespace,
                window.as_deref(),
                resolution.as_deref(),
                tolerance,
                cli.format,
            )
            .await?;
        }
    }

    Ok(())
}
