//! HTTP client for the allocation API

use super::model::{Allocation, AllocationResponse};
use crate::error::{CostvalError, Result};
use crate::reconstruct::Window;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path of the allocation endpoint, relative to the API's base URL
pub const ALLOCATION_PATH: &str = "/allocation/compute";

/// Client for the allocation API
#[derive(Debug, Clone)]
pub struct AllocationClient {
    client: Client,
    base_url: Url,
}

impl AllocationClient {
    /// Create a new client with a 30 second timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CostvalError::Transport(format!("failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(base_url)?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request and decode the JSON body
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut url = self.base_url.clone();
        url.set_path(&format!("{}{path}", self.base_url.path().trim_end_matches('/')));
        url.query_pairs_mut().extend_pairs(query);

        debug!(url = %url, "Requesting allocation data");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CostvalError::Transport(format!(
                "allocation API error ({status}): {body}"
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| CostvalError::Decode(e.to_string()))
    }

    /// Accumulated allocations over `window`, keyed by aggregate name
    pub async fn allocation(
        &self,
        window: &Window,
        aggregate: &str,
    ) -> Result<BTreeMap<String, Allocation>> {
        let window_param = format!(
            "{},{}",
            window.start().to_rfc3339_opts(SecondsFormat::Secs, true),
            window.end().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let query = [
            ("window", window_param),
            ("aggregate", aggregate.to_string()),
            ("accumulate", "true".to_string()),
        ];

        let response: AllocationResponse = self.get(ALLOCATION_PATH, &query).await?;
        if response.code != 200 {
            return Err(CostvalError::Transport(format!(
                "allocation API returned code {}: {}",
                response.code,
                response.message.unwrap_or_default()
            )));
        }

        Ok(response.data.into_iter().next().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;

    fn window() -> Window {
        Window::new(
            Utc.timestamp_opt(1_699_920_000, 0).unwrap(),
            Utc.timestamp_opt(1_700_006_400, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_allocation_by_namespace() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/allocation/compute")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "window".into(),
                    "2023-11-14T00:00:00Z,2023-11-15T00:00:00Z".into(),
                ),
                Matcher::UrlEncoded("aggregate".into(), "namespace".into()),
                Matcher::UrlEncoded("accumulate".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"code": 200, "data": [{
                    "shop": {"name": "shop", "minutes": 1440, "cpuCoreHours": 24},
                    "kube-system": {"name": "kube-system", "minutes": 1440, "cpuCoreHours": 2}
                }]}"#,
            )
            .create_async()
            .await;

        let client = AllocationClient::new(&server.url()).unwrap();
        let allocations = client.allocation(&window(), "namespace").await.unwrap();

        mock.assert_async().await;
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations["shop"].cpu_core_hours, 24.0);
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/allocation/compute")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = AllocationClient::new(&server.url()).unwrap();
        let err = client.allocation(&window(), "namespace").await.unwrap_err();

        assert!(matches!(err, CostvalError::Transport(_)));
    }

    #[tokio::test]
    async fn test_error_code_in_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/allocation/compute")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code": 400, "message": "invalid window"}"#)
            .create_async()
            .await;

        let client = AllocationClient::new(&server.url()).unwrap();
        let err = client.allocation(&window(), "namespace").await.unwrap_err();

        assert!(err.to_string().contains("invalid window"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/allocation/compute")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let client = AllocationClient::new(&server.url()).unwrap();
        let err = client.allocation(&window(), "namespace").await.unwrap_err();

        assert!(matches!(err, CostvalError::Decode(_)));
    }
}
