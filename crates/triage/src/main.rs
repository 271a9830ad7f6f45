//! Triage CLI
//!
//! Aggregates test failures across the recent runs (and re-run attempts) of a
//! GitHub Actions workflow and prints them ranked by frequency.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use triage::{
    render_json, render_text, run_pipeline, GitHubClient, PipelineConfig, Report,
    RunStatusFilter,
};

/// Aggregate test failures across GitHub Actions workflow runs
#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Aggregate test failures across GitHub Actions workflow runs")]
#[command(version)]
struct Cli {
    /// Repository to inspect (e.g., octo/widgets)
    #[arg(long)]
    repo: String,

    /// Workflow file name (e.g., ci.yml) or numeric workflow ID
    #[arg(long)]
    workflow: String,

    /// Which runs to include [default: failure]
    #[arg(long, value_enum)]
    status: Option<RunStatusFilter>,

    /// Days to look back [default: 7]
    #[arg(long)]
    days: Option<u32>,

    /// Attempts processed in parallel [default: 5]
    #[arg(long)]
    concurrency: Option<usize>,

    /// TOML file with pipeline defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// GitHub API root [default: https://api.github.com]
    #[arg(long)]
    api_url: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// GitHub token with `actions:read` access
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    /// Merge flags over the optional config file.
    fn pipeline_config(&self) -> Result<PipelineConfig, triage::TriageError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        config.repository.clone_from(&self.repo);
        config.workflow.clone_from(&self.workflow);
        if let Some(status) = self.status {
            config.status = status;
        }
        if let Some(days) = self.days {
            config.lookback_days = days;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(api_url) = &self.api_url {
            config.api_url.clone_from(api_url);
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("triage=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("triage=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(token) = cli.token.clone().filter(|t| !t.trim().is_empty()) else {
        Cli::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "a GitHub token is required: set GITHUB_TOKEN or pass --token",
            )
            .exit();
    };

    let config = match cli.pipeline_config() {
        Ok(config) => config,
        Err(e) => Cli::command()
            .error(clap::error::ErrorKind::InvalidValue, e.to_string())
            .exit(),
    };
    debug!(?config, "Resolved configuration");

    let client = GitHubClient::with_base_url(token, &config.api_url)
        .context("Failed to create GitHub client")?;

    let now = Utc::now();
    info!(
        repository = %config.repository,
        workflow = %config.workflow,
        days = config.lookback_days,
        "Collecting test failures"
    );
    let outcome = run_pipeline(Arc::new(client), &config, now)
        .await
        .context("Failed to collect workflow runs")?;

    let report = Report {
        repository: config.repository.clone(),
        workflow: config.workflow.clone(),
        since: config.window_start(now),
        stats: outcome.stats,
        failures: outcome.failures,
        failed_attempts: outcome.failed_attempts,
    };

    match cli.format {
        OutputFormat::Text => print!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }

    Ok(())
}
