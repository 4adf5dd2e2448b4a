//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::{Duration, Local, NaiveDate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Funnelboard - sales pipeline dashboard for RD Station CRM
///
/// Fetch deals for a period and render funnel, owner, team and stage
/// views as Markdown, JSON or CSV.
///
/// Examples:
///   funnelboard --view funnel --days 7
///   funnelboard --view pivot --team "Team Fenix" --format csv -o pivot.csv
///   funnelboard --view detail --pipeline 64f0... --user "Ann"
///   funnelboard --view users --input deals.json
///   funnelboard --view funnel --watch 60
///   funnelboard --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Dashboard view to render
    #[arg(long, default_value = "funnel", value_name = "VIEW")]
    pub view: View,

    /// CRM base URL
    ///
    /// Can also be set via CRM_BASE_URL or .funnelboard.toml.
    #[arg(long, value_name = "URL", env = "CRM_BASE_URL")]
    pub base_url: Option<String>,

    /// CRM API token
    ///
    /// Can also be set via CRM_API_TOKEN or .funnelboard.toml.
    #[arg(long, value_name = "TOKEN", env = "CRM_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// First day of the period (YYYY-MM-DD)
    ///
    /// Defaults to --days before the end date.
    #[arg(long, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last day of the period (YYYY-MM-DD), defaults to today
    #[arg(long, value_name = "DATE")]
    pub end: Option<NaiveDate>,

    /// Length of the period in days when --start is not given
    #[arg(long, default_value = "30", value_name = "DAYS")]
    pub days: u32,

    /// Team whose deals feed the funnel view ("All" for everyone)
    #[arg(long, default_value = "All", value_name = "TEAM")]
    pub team: String,

    /// Restrict the stage detail view to one deal owner
    #[arg(long, value_name = "NAME")]
    pub user: Option<String>,

    /// Pipeline whose deals and stages are fetched
    #[arg(long, value_name = "ID", env = "CRM_PIPELINE_ID")]
    pub pipeline: Option<String>,

    /// Maximum number of deals per request
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<u32>,

    /// Output format (markdown, json, csv)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .funnelboard.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Re-render the view every SECS seconds until Ctrl-C
    ///
    /// Responses are served from the cache while they are fresh.
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Read deals from a saved `/deals` JSON payload instead of the CRM
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Read stage definitions from a saved `/deal_stages` JSON payload
    #[arg(long, value_name = "FILE")]
    pub stages_input: Option<PathBuf>,

    /// Generate a default .funnelboard.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Dashboard views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum View {
    /// Deals per rating stage
    #[default]
    Funnel,
    /// Deal count per owner
    Users,
    /// Owner × stage grid
    Pivot,
    /// Team × stage grid
    Teams,
    /// Deals bucketed by pipeline stage
    Detail,
    /// Stage definitions
    Stages,
    /// Available pipelines
    Pipelines,
}

impl View {
    /// Whether the view is built from deals.
    pub fn needs_deals(self) -> bool {
        !matches!(self, View::Stages | View::Pipelines)
    }

    /// Whether the view is built from stage definitions.
    pub fn needs_stages(self) -> bool {
        matches!(self, View::Detail | View::Stages)
    }

    /// Prefix used for exported file names.
    pub fn export_prefix(self) -> &'static str {
        match self {
            View::Funnel => "sales_funnel",
            View::Users => "deals_per_user",
            View::Pivot => "deals_by_user_and_stage",
            View::Teams => "team_comparison",
            View::Detail => "deals_by_stage",
            View::Stages => "stage_catalog",
            View::Pipelines => "pipelines",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            View::Funnel => "funnel",
            View::Users => "users",
            View::Pivot => "pivot",
            View::Teams => "teams",
            View::Detail => "detail",
            View::Stages => "stages",
            View::Pipelines => "pipelines",
        };
        f.write_str(name)
    }
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
    /// CSV of the view's rows
    Csv,
}

impl OutputFormat {
    /// Whether the format is meant for other programs rather than people.
    pub fn is_machine_readable(self) -> bool {
        !matches!(self, OutputFormat::Markdown)
    }

    /// File extension for reports written in this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Shortest allowed --watch interval, in seconds.
pub const MIN_WATCH_SECS: u64 = 10;

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether payloads come from local files instead of the CRM.
    pub fn is_offline(&self) -> bool {
        self.input.is_some() || self.stages_input.is_some()
    }

    /// Resolve the reporting period relative to `today`.
    pub fn period(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.end.unwrap_or(today);
        let start = self.start.unwrap_or_else(|| {
            end.checked_sub_signed(Duration::days(i64::from(self.days)))
                .unwrap_or(NaiveDate::MIN)
        });
        (start, end)
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        self.validate_at(Local::now().date_naive())
    }

    fn validate_at(&self, today: NaiveDate) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Validate base URL format
        if let Some(ref base_url) = self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err("CRM base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Token length is checked again after merging the config file
        if let Some(ref token) = self.token {
            if !self.is_offline() && token.trim().len() <= 10 {
                return Err("CRM API token looks too short".to_string());
            }
        }

        // Validate period
        let (start, end) = self.period(today);
        if start > end {
            return Err(format!(
                "Start date {} is after end date {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ));
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.limit == Some(0) {
            return Err("Limit must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(interval) = self.watch {
            if interval < MIN_WATCH_SECS {
                return Err(format!(
                    "Watch interval must be at least {} seconds",
                    MIN_WATCH_SECS
                ));
            }
        }

        // Offline inputs must exist
        for path in [&self.input, &self.stages_input].into_iter().flatten() {
            if !path.is_file() {
                return Err(format!("Input file does not exist: {}", path.display()));
            }
        }

        if self.is_offline() {
            if self.view.needs_deals() && self.input.is_none() {
                return Err(format!("The {} view needs --input when offline", self.view));
            }
            if self.view.needs_stages() && self.stages_input.is_none() {
                return Err(format!(
                    "The {} view needs --stages-input when offline",
                    self.view
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_args() -> Args {
        Args {
            view: View::Funnel,
            base_url: None,
            token: None,
            start: None,
            end: None,
            days: 30,
            team: "All".to_string(),
            user: None,
            pipeline: None,
            limit: None,
            format: None,
            output: None,
            config: None,
            verbose: false,
            quiet: false,
            timeout: None,
            watch: None,
            input: None,
            stages_input: None,
            init_config: false,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "funnelboard",
            "--view",
            "pivot",
            "--start",
            "2024-03-01",
            "--end",
            "2024-03-31",
            "--format",
            "csv",
            "--team",
            "Team Fenix",
        ])
        .unwrap();

        assert_eq!(args.view, View::Pivot);
        assert_eq!(args.start, Some(date(2024, 3, 1)));
        assert_eq!(args.format, Some(OutputFormat::Csv));
        assert_eq!(args.team, "Team Fenix");
        assert_eq!(args.days, 30);
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        assert!(Args::try_parse_from(["funnelboard", "--start", "03/01/2024"]).is_err());
    }

    #[test]
    fn test_period_defaults() {
        let mut args = make_args();
        let today = date(2024, 6, 30);

        assert_eq!(args.period(today), (date(2024, 5, 31), today));

        args.days = 7;
        args.end = Some(date(2024, 6, 10));
        assert_eq!(args.period(today), (date(2024, 6, 3), date(2024, 6, 10)));

        args.start = Some(date(2024, 1, 1));
        assert_eq!(args.period(today).0, date(2024, 1, 1));
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.base_url = Some("crm.example.com".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_short_token() {
        let mut args = make_args();
        args.token = Some("abc".to_string());
        assert!(args.validate().is_err());

        args.token = Some("0123456789abcdef".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_period_order() {
        let mut args = make_args();
        args.start = Some(date(2024, 5, 2));
        args.end = Some(date(2024, 5, 1));
        assert!(args.validate_at(date(2024, 6, 1)).is_err());

        args.end = Some(date(2024, 5, 2));
        assert!(args.validate_at(date(2024, 6, 1)).is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_limits() {
        let mut args = make_args();
        args.limit = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.watch = Some(5);
        assert!(args.validate().is_err());
        args.watch = Some(MIN_WATCH_SECS);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_input() {
        let mut args = make_args();
        args.input = Some(PathBuf::from("/nonexistent/deals.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.init_config = true;
        args.limit = Some(0);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_offline_mode() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut args = make_args();
        assert!(!args.is_offline());

        args.input = Some(file.path().to_path_buf());
        args.token = Some("abc".to_string());
        assert!(args.is_offline());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_offline_inputs_match_view() {
        let deals = tempfile::NamedTempFile::new().unwrap();
        let stages = tempfile::NamedTempFile::new().unwrap();

        let mut args = make_args();
        args.view = View::Detail;
        args.input = Some(deals.path().to_path_buf());
        let err = args.validate().unwrap_err();
        assert!(err.contains("--stages-input"));

        args.stages_input = Some(stages.path().to_path_buf());
        assert!(args.validate().is_ok());

        args.view = View::Stages;
        args.input = None;
        assert!(args.validate().is_ok());

        args.view = View::Pivot;
        let err = args.validate().unwrap_err();
        assert!(err.contains("--input"));
    }

    #[test]
    fn test_view_requirements() {
        assert!(View::Funnel.needs_deals());
        assert!(!View::Funnel.needs_stages());
        assert!(View::Detail.needs_deals());
        assert!(View::Detail.needs_stages());
        assert!(!View::Stages.needs_deals());
        assert!(!View::Pipelines.needs_stages());
        assert_eq!(View::Detail.to_string(), "detail");
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
