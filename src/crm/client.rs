//! HTTP client for the RD Station CRM REST API.

use crate::crm::source::{CrmError, CrmSource, DealQuery};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Configuration for the CRM client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://crm.rdstation.com".to_string(),
            token: String::new(),
            timeout_seconds: 30,
        }
    }
}

/// Thin wrapper around the CRM's `/api/v1` endpoints.
pub struct CrmClient {
    base_url: String,
    token: String,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl CrmClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self, CrmError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
            timeout_seconds: config.timeout_seconds,
            http_client,
        })
    }

    /// Base URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    /// Send a GET request with the token and `params` in the query string.
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, CrmError> {
        let url = self.endpoint(path);
        debug!("GET {} ({} params)", url, params.len());

        let response = self
            .http_client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CrmError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    CrmError::Connect(self.base_url.clone())
                } else {
                    CrmError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        debug!("GET {} -> {} ({} bytes)", url, status, body.len());

        serde_json::from_str(&body).map_err(|source| CrmError::Decode {
            origin: url,
            source,
        })
    }
}

#[async_trait]
impl CrmSource for CrmClient {
    async fn deals(&self, query: &DealQuery) -> Result<Value, CrmError> {
        self.get("deals", &query.params()).await
    }

    async fn stages(&self, pipeline_id: Option<&str>) -> Result<Value, CrmError> {
        let params: Vec<(&str, String)> = pipeline_id
            .map(|id| vec![("deal_pipeline_id", id.to_string())])
            .unwrap_or_default();
        self.get("deal_stages", &params).await
    }

    async fn pipelines(&self) -> Result<Value, CrmError> {
        self.get("deal_pipelines", &[]).await
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "https://crm.rdstation.com");
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = CrmClient::new(ClientConfig {
            base_url: "https://crm.example.com//".to_string(),
            token: "0123456789abcdef".to_string(),
            timeout_seconds: 5,
        })
        .unwrap();

        assert_eq!(client.base_url(), "https://crm.example.com");
        assert_eq!(
            client.endpoint("deals"),
            "https://crm.example.com/api/v1/deals"
        );
        assert_eq!(client.describe(), "https://crm.example.com");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let client = CrmClient::new(ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            token: "0123456789abcdef".to_string(),
            timeout_seconds: 2,
        })
        .unwrap();

        assert!(client.pipelines().await.is_err());
    }
}
