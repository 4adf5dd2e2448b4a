//! Sources of CRM payloads.
//!
//! [`CrmSource`] is the seam between the dashboard and wherever the JSON
//! comes from: the live REST API, the TTL cache in front of it, or local
//! files for offline runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while fetching a payload.
#[derive(Debug, Error)]
pub enum CrmError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The CRM host could not be reached.
    #[error("cannot connect to CRM at {0}")]
    Connect(String),

    /// Any other transport failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The CRM answered with a non-success status.
    #[error("CRM API error {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body is not valid JSON.
    #[error("invalid JSON from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    /// An offline input file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source cannot serve this kind of request.
    #[error("{0}")]
    Unsupported(String),
}

/// Parameters of a deal listing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DealQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub limit: u32,
    pub pipeline_id: Option<String>,
}

impl DealQuery {
    /// Query-string pairs, without the token.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("start_date", self.start_date.format("%Y-%m-%d").to_string()),
            ("end_date", self.end_date.format("%Y-%m-%d").to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(ref pipeline) = self.pipeline_id {
            params.push(("deal_pipeline_id", pipeline.clone()));
        }
        params
    }
}

/// Anything that can produce raw CRM payloads.
#[async_trait]
pub trait CrmSource: Send + Sync {
    /// Fetches the `/deals` payload.
    async fn deals(&self, query: &DealQuery) -> Result<Value, CrmError>;

    /// Fetches the `/deal_stages` payload, optionally for one pipeline.
    async fn stages(&self, pipeline_id: Option<&str>) -> Result<Value, CrmError>;

    /// Fetches the `/deal_pipelines` payload.
    async fn pipelines(&self) -> Result<Value, CrmError>;

    /// Human-readable origin, used in report metadata.
    fn describe(&self) -> String;
}

/// Offline source reading payloads saved as JSON files.
#[derive(Debug, Clone)]
pub struct FileSource {
    deals: Option<PathBuf>,
    stages: Option<PathBuf>,
}

impl FileSource {
    /// Create a source from optional deals and stages files.
    pub fn new(deals: Option<PathBuf>, stages: Option<PathBuf>) -> Self {
        Self { deals, stages }
    }

    async fn read(path: &Path) -> Result<Value, CrmError> {
        debug!("Reading payload from {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CrmError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        serde_json::from_str(&content).map_err(|source| CrmError::Decode {
            origin: path.display().to_string(),
            source,
        })
    }
}

#[async_trait]
impl CrmSource for FileSource {
    async fn deals(&self, _query: &DealQuery) -> Result<Value, CrmError> {
        match self.deals {
            Some(ref path) => Self::read(path).await,
            None => Err(CrmError::Unsupported(
                "no deals file given (use --input)".to_string(),
            )),
        }
    }

    async fn stages(&self, _pipeline_id: Option<&str>) -> Result<Value, CrmError> {
        match self.stages {
            Some(ref path) => Self::read(path).await,
            None => Err(CrmError::Unsupported(
                "no stages file given (use --stages-input)".to_string(),
            )),
        }
    }

    async fn pipelines(&self) -> Result<Value, CrmError> {
        Err(CrmError::Unsupported(
            "pipelines are only available from the live CRM".to_string(),
        ))
    }

    fn describe(&self) -> String {
        match (&self.deals, &self.stages) {
            (Some(deals), _) => deals.display().to_string(),
            (None, Some(stages)) => stages.display().to_string(),
            (None, None) => "offline".to_string(),
        }
    }
}
