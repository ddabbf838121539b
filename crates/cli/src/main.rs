//! Kontext CLI
//!
//! Terminal front end for editing images with a ComfyUI Flux Kontext
//! workflow.

mod commands;
mod config;
mod messages;
mod session;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kontext_comfyui::api::ComfyUIApi;
use kontext_core::workflow_store::{TemplateSource, WorkflowStore};
use kontext_pipeline::orchestrator::{JobOrchestrator, OrchestratorConfig};
use kontext_pipeline::poll::PollConfig;

use commands::{handle_command, Commands};
use config::{ClientConfig, LogFormat};

const DEFAULT_LOG_FILTER: &str = "kontext=info,kontext_pipeline=info,kontext_comfyui=info";

#[derive(Parser)]
#[command(name = "kontext")]
#[command(about = "Edit images with a ComfyUI Flux Kontext workflow", long_about = None)]
struct Cli {
    /// ComfyUI base URL (overrides the environment)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Workflow template JSON file
    #[arg(long, global = true)]
    workflow: Option<PathBuf>,

    /// Give up on a job after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // --- Configuration ---
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(workflow) = cli.workflow {
        config.workflow_path = workflow;
    }
    if let Some(secs) = cli.timeout_secs {
        config.job_timeout = Duration::from_secs(secs);
    }

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::debug!(
        api_url = %config.api_url,
        environment = ?config.environment,
        workflow = %config.workflow_path.display(),
        "Loaded client configuration",
    );

    // --- Orchestrator ---
    let orchestrator = build_orchestrator(&config)?;

    let result = handle_command(cli.command, &orchestrator, &config).await;
    orchestrator.cleanup().await;
    result
}

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    );

    // Logs go to stderr; stdout carries command output only.
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn build_orchestrator(config: &ClientConfig) -> Result<JobOrchestrator> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let api = ComfyUIApi::with_client(client, config.api_url.as_str());

    let workflows = WorkflowStore::new(TemplateSource::File(config.workflow_path.clone()));
    let orchestrator_config = OrchestratorConfig {
        poll: PollConfig {
            interval: config.poll_interval,
            timeout: config.job_timeout,
        },
        ..Default::default()
    };

    Ok(JobOrchestrator::new(api, workflows, orchestrator_config))
}
