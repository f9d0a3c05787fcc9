//! Redash query result fetcher
//!
//! Issues a single read of `{domain}/api/queries/{id}/results.json` and
//! parses the latest cached result set. The [`QueryClient`] trait exists so
//! the pipeline can be driven by a mock in tests without a live Redash
//! instance.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// One column descriptor as reported by the query result.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub friendly_name: String,
}

/// The columns and rows of a cached query result.
///
/// Row objects arrive as JSON maps whose key order is not guaranteed to
/// match the column order; normalization fixes that downstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryData {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ResultsEnvelope {
    query_result: Option<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    data: Option<QueryData>,
}

/// Read access to cached query results.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn fetch(&self, query_id: &str) -> Result<QueryData>;
}

/// HTTP client for the Redash results endpoint.
pub struct RedashClient {
    client: Client,
    domain: String,
    api_key: String,
}

impl RedashClient {
    pub fn new(domain: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Fetch(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            domain: domain.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl QueryClient for RedashClient {
    async fn fetch(&self, query_id: &str) -> Result<QueryData> {
        let url = format!("{}/api/queries/{}/results.json", self.domain, query_id);
        debug!("Fetching query results from {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "Query {query_id} results request returned HTTP {status}"
            )));
        }

        let envelope: ResultsEnvelope = response
            .json()
            .await
            .map_err(|e| Error::Fetch(format!("Failed to parse query {query_id} results: {e}")))?;

        let data = envelope
            .query_result
            .and_then(|r| r.data)
            .unwrap_or_default();
        debug!(
            "Query {} returned {} columns, {} rows",
            query_id,
            data.columns.len(),
            data.rows.len()
        );
        Ok(data)
    }
}

/// Mock query client returning predefined results, for tests.
#[derive(Default)]
pub struct MockQueryClient {
    responses: Arc<Mutex<Vec<Result<QueryData>>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `fetch` call.
    pub async fn add_response(&self, response: Result<QueryData>) {
        self.responses.lock().await.push(response);
    }

    /// Query IDs fetched so far, for verification.
    pub async fn fetched_ids(&self) -> Vec<String> {
        self.fetched.lock().await.clone()
    }
}

#[async_trait]
impl QueryClient for MockQueryClient {
    async fn fetch(&self, query_id: &str) -> Result<QueryData> {
        self.fetched.lock().await.push(query_id.to_string());
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            return Err(Error::Fetch("No mock response configured".to_string()));
        }
        responses.remove(0)
    }
}
