//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.funnelboard.toml` files.

use crate::analysis::TeamRoster;
use crate::cli::{Args, OutputFormat};
use crate::crm::{CacheSettings, ClientConfig};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE: &str = ".funnelboard.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// CRM connection settings.
    #[serde(default)]
    pub crm: CrmConfig,

    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Funnel layout and team rosters.
    #[serde(default)]
    pub funnel: FunnelConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// CRM connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Base URL of the CRM instance.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API token. Prefer the `CRM_API_TOKEN` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of deals per request.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Pipeline used when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_seconds: default_timeout(),
            limit: default_limit(),
            pipeline_id: None,
        }
    }
}

fn default_base_url() -> String {
    "https://crm.rdstation.com".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_limit() -> u32 {
    200
}

impl CrmConfig {
    /// Check the settings needed to talk to the live CRM.
    pub fn check_credentials(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            bail!("CRM base URL must start with 'http://' or 'https://'");
        }

        match self.token.as_deref().map(str::trim) {
            None | Some("") => {
                bail!("No CRM API token configured (use --token or CRM_API_TOKEN)")
            }
            Some(token) if token.len() <= 10 => bail!("CRM API token looks too short"),
            Some(_) => Ok(()),
        }
    }

    /// Client settings for [`crate::crm::CrmClient`].
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            token: self.token.clone().unwrap_or_default(),
            timeout_seconds: self.timeout_seconds,
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a response stays fresh, in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,

    /// Maximum number of cached responses.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_max_entries() -> u64 {
    256
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.ttl_seconds),
            max_entries: self.max_entries,
        }
    }
}

/// Funnel layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelConfig {
    /// Column order of the stage pivots.
    #[serde(default = "default_stage_order")]
    pub stage_order: Vec<String>,

    /// Team name to member display names.
    #[serde(default)]
    pub teams: TeamRoster,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            stage_order: default_stage_order(),
            teams: TeamRoster::new(),
        }
    }
}

fn default_stage_order() -> Vec<String> {
    vec![
        "LEADs",
        "LIGAÇÃO 1",
        "MENSAGEM",
        "LIGAÇÃO 2",
        "FOLLOW UP",
        "AGENDAMENTO",
        "ATENDIMENTO REALIZADO",
        "NEGOCIAÇÃO",
        "FECHAMENTO",
        "PERDIDA",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Report rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Symbol placed before monetary amounts.
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// Output format used when `--format` is not given.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            currency_symbol: default_currency_symbol(),
            format: OutputFormat::default(),
        }
    }
}

fn default_currency_symbol() -> String {
    "R$".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and their environment variables) take precedence over
    /// config file settings. Only values actually provided override.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref base_url) = args.base_url {
            self.crm.base_url = base_url.clone();
        }
        if let Some(ref token) = args.token {
            self.crm.token = Some(token.clone());
        }
        if let Some(timeout) = args.timeout {
            self.crm.timeout_seconds = timeout;
        }
        if let Some(limit) = args.limit {
            self.crm.limit = limit;
        }
        if let Some(ref pipeline) = args.pipeline {
            self.crm.pipeline_id = Some(pipeline.clone());
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
