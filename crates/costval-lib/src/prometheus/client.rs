//! HTTP client for the metrics engine's instant-query endpoint

use super::response::{QueryData, QueryResponse};
use super::{async_trait, MetricsSource};
use crate::error::{CostvalError, Result};
use crate::query::QuerySpec;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the metrics engine
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: Client,
    base_url: String,
}

impl PrometheusClient {
    /// Create a new client with the default timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a new client with a custom request timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base_url)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CostvalError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the URL for a spec and fetch it
    pub async fn execute(&self, spec: &QuerySpec) -> Result<QueryData> {
        let url = spec.to_url(&self.base_url)?;
        debug!(metric = %spec.metric(), url = %url, "Issuing metrics query");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // The engine reports query errors in its own envelope, even on 4xx.
            if let Ok(envelope) = serde_json::from_str::<QueryResponse>(&body) {
                if envelope.status == "error" {
                    return envelope.into_data();
                }
            }
            return Err(CostvalError::Transport(format!(
                "metrics engine returned {status}: {body}"
            )));
        }

        let envelope: QueryResponse =
            serde_json::from_str(&body).map_err(|e| CostvalError::Decode(e.to_string()))?;
        envelope.into_data()
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn query(&self, spec: &QuerySpec) -> Result<QueryData> {
        self.execute(spec).await
    }
}
