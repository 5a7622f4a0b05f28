//! Jimaku API client.

use super::links::DeepLinks;
use super::types::*;
use anyhow::{Context, Result};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use shared::config::JimakuConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure to obtain a usable response from the service
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, timeout or request construction failure
    #[error("request to subtitle service failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A 200 response whose body was not the expected JSON
    #[error("malformed response from subtitle service: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ApiError {
    /// Classify a failure while reading a response body; only JSON errors
    /// count as a malformed response, interrupted reads are transport errors
    fn from_body(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e)
        } else {
            ApiError::Transport(e)
        }
    }
}

/// Result of a search request that reached the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// 200 response; possibly empty
    Entries(Vec<Entry>),
    /// Any non-200 status
    Rejected(StatusCode),
}

/// Jimaku API client
pub struct JimakuClient {
    /// HTTP client
    client: Client,
    /// Base URL for the service
    base_url: String,
    /// Entry fetched when checking an API key
    verification_entry_id: u64,
}

impl JimakuClient {
    /// Create a new Jimaku client
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        verification_entry_id: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            verification_entry_id,
        })
    }

    /// Create a client from the `[jimaku]` config section
    pub fn from_config(config: &JimakuConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            &config.user_agent,
            Duration::from_secs(config.timeout_seconds),
            config.verification_entry_id,
        )
    }

    /// Deep links for this client's service
    pub fn links(&self) -> DeepLinks {
        DeepLinks::new(self.base_url.clone())
    }

    /// Search entries by an external id
    pub async fn search(
        &self,
        field: SearchField,
        value: &str,
        api_key: &str,
    ) -> Result<SearchOutcome, ApiError> {
        let url = format!("{}/api/entries/search", self.base_url);

        debug!(url = %url, field = %field, value = value, "Searching subtitle entries");

        let response = self
            .client
            .get(&url)
            .query(&[(field.as_str(), value)])
            .header(AUTHORIZATION, api_key)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(url = %url, status = %status, "Search rejected");
            return Ok(SearchOutcome::Rejected(status));
        }

        let entries = response
            .json::<Vec<Entry>>()
            .await
            .map_err(ApiError::from_body)?;

        debug!(url = %url, results = entries.len(), "Search successful");
        Ok(SearchOutcome::Entries(entries))
    }

    /// Check whether the service accepts an API key
    ///
    /// Only a 401 counts as rejection; other failures are left to the
    /// lookups themselves.
    pub async fn verify_key(&self, api_key: &str) -> Result<bool, ApiError> {
        let url = format!("{}/api/entries/{}", self.base_url, self.verification_entry_id);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, api_key)
            .send()
            .await?;

        let status = response.status();
        debug!(url = %url, status = %status, "Verified API key");
        Ok(status != StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = JimakuClient::from_config(&JimakuConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_links_share_base_url() {
        let client =
            JimakuClient::new("https://jimaku.cc/", "test", Duration::from_secs(5), 729).unwrap();
        assert_eq!(client.links().entry(1), "https://jimaku.cc/entry/1");
    }
}
