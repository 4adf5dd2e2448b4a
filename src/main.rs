//! Funnelboard - sales pipeline dashboard for RD Station CRM
//!
//! A CLI tool that fetches deals and stage definitions from the CRM,
//! aggregates them into funnel, owner, team and stage views, and renders
//! the result as Markdown, JSON or CSV.
//!
//! Exit codes:
//!   0 - Success (including a period without deals)
//!   1 - Runtime error (connection, config, invalid arguments, etc.)
//!   2 - The CRM answered with a payload that could not be interpreted

mod analysis;
mod cli;
mod config;
mod crm;
mod dashboard;
mod models;
mod report;

use anyhow::{Context, Result};
use chrono::Local;
use cli::{Args, OutputFormat, View};
use config::{Config, CONFIG_FILE};
use crm::{CachedSource, CrmClient, CrmSource, DealQuery, FileSource};
use dashboard::{DashboardError, ViewRequest};
use indicatif::{ProgressBar, ProgressStyle};
use models::Report;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Funnelboard v{}", env!("CARGO_PKG_VERSION"));
    debug!("View: {}, offline: {}", args.view, args.is_offline());

    match run_dashboard(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Dashboard failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .funnelboard.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the CRM URL, stage order and team rosters.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Settings shared by every render of a run.
struct RenderOptions {
    format: OutputFormat,
    output: Option<PathBuf>,
    quiet: bool,
}

/// Run the dashboard. Returns the process exit code.
async fn run_dashboard(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let (start_date, end_date) = args.period(Local::now().date_naive());
    info!(
        "Period: {} to {}",
        start_date.format("%Y-%m-%d"),
        end_date.format("%Y-%m-%d")
    );

    let request = ViewRequest {
        view: args.view,
        query: DealQuery {
            start_date,
            end_date,
            limit: config.crm.limit,
            pipeline_id: config.crm.pipeline_id.clone(),
        },
        team: args.team.clone(),
        user: args.user.clone(),
        stage_order: config.funnel.stage_order.clone(),
        teams: config.funnel.teams.clone(),
        currency_symbol: config.report.currency_symbol.clone(),
    };

    if args.team != analysis::ALL_TEAMS && !config.funnel.teams.contains_key(&args.team) {
        warn!("Team '{}' is not in the config; showing all deals", args.team);
    }

    let options = RenderOptions {
        format: config.report.format,
        output: args.output.clone(),
        quiet: args.quiet,
    };

    if args.is_offline() {
        info!("Reading payloads from local files");
        let source = FileSource::new(args.input.clone(), args.stages_input.clone());
        run_with_source(source, &config, &request, &options, args.watch).await
    } else {
        config.crm.check_credentials()?;
        let client = CrmClient::new(config.crm.client_config())
            .context("Failed to create CRM client")?;
        info!("CRM: {}", client.base_url());
        run_with_source(client, &config, &request, &options, args.watch).await
    }
}

/// Render once, or keep re-rendering in watch mode until Ctrl-C.
async fn run_with_source<S: CrmSource>(
    source: S,
    config: &Config,
    request: &ViewRequest,
    options: &RenderOptions,
    watch: Option<u64>,
) -> Result<i32> {
    let source = CachedSource::new(source, config.cache.settings());

    let Some(interval) = watch else {
        return render_once(&source, request, options).await;
    };

    eprintln!(
        "🔄 Watch mode: refreshing every {}s (Ctrl-C to stop)",
        interval
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(interval));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match render_once(&source, request, options).await {
                    Ok(0) => {}
                    Ok(code) => warn!("Render finished with exit code {}", code),
                    Err(e) => error!("Refresh failed: {:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch mode");
                return Ok(0);
            }
        }
    }
}

/// Build one report and write it out. Returns the exit code.
async fn render_once<S: CrmSource>(
    source: &S,
    request: &ViewRequest,
    options: &RenderOptions,
) -> Result<i32> {
    let to_stdout = options.output.is_none();
    let spinner =
        fetch_spinner(options.quiet || (to_stdout && options.format.is_machine_readable()));
    spinner.set_message(format!("Fetching {} data...", request.view));

    let result = dashboard::build_report(source, request).await;
    spinner.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(DashboardError::Payload(e)) => {
            eprintln!("⚠️  Could not interpret the CRM response: {}", e);
            return Ok(2);
        }
        Err(e) => return Err(e.into()),
    };

    if request.view.needs_deals() && report.metadata.records == 0 {
        eprintln!("ℹ️  No deals found for this period.");
        return Ok(0);
    }
    if report.is_empty() {
        debug!("View {} has no rows", request.view);
    }

    let content = render(&report, options.format)?;

    match options.output {
        Some(ref output) => {
            let path = output_path(output, &report, request.view, options.format);
            report::write_report(&content, &path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !options.quiet {
                println!("✅ Report saved to: {}", path.display());
            }
        }
        None => print!("{}", content),
    }

    Ok(0)
}

fn render(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(report::generate_markdown_report(report)),
        OutputFormat::Json => report::generate_json_report(report),
        OutputFormat::Csv => report::generate_csv_report(report),
    }
}

/// An existing directory as `--output` receives a file named after the view,
/// the period and the format.
fn output_path(output: &Path, report: &Report, view: View, format: OutputFormat) -> PathBuf {
    if !output.is_dir() {
        return output.to_path_buf();
    }

    let file_name = report::export_file_name(
        view.export_prefix(),
        report.metadata.start_date,
        report.metadata.end_date,
        format.extension(),
    );
    output.join(file_name)
}

/// Spinner shown while payloads are fetched.
fn fetch_spinner(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
