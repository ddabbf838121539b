//! Commands module
//!
//! Defines the CLI commands and their handlers.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use kontext_comfyui::status::JobStatus;
use kontext_core::image::{mime_type_for_path, validate_image_file};
use kontext_core::workflow;
use kontext_pipeline::error::ProcessFailure;
use kontext_pipeline::orchestrator::{ImageUpload, JobOrchestrator, ProcessRequest, ProcessResult};

use crate::config::ClientConfig;
use crate::messages::user_message;
use crate::session;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Check that ComfyUI and the workflow template are usable
    Health,
    /// Apply one edit instruction to an image
    Process {
        /// Input image (JPG or PNG, at most 10 MB)
        #[arg(short, long)]
        image: PathBuf,

        /// Edit instruction, e.g. "make the sky purple"
        #[arg(short, long)]
        prompt: String,

        /// Where to write the result (defaults to the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Edit an image interactively, one prompt per line
    Session {
        /// Starting image
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Interrupt whatever ComfyUI is currently executing
    Interrupt,
    /// Show running and pending jobs
    Queue,
    /// Remove all pending jobs from the queue
    ClearQueue,
    /// Summarise and validate the workflow template
    Workflow,
}

/// Route a command to its handler.
pub async fn handle_command(
    command: Commands,
    orchestrator: &JobOrchestrator,
    config: &ClientConfig,
) -> Result<()> {
    match command {
        Commands::Health => health(orchestrator).await,
        Commands::Process {
            image,
            prompt,
            output,
        } => process(orchestrator, config, &image, &prompt, output).await,
        Commands::Session { image } => session::run(orchestrator, config, &image).await,
        Commands::Interrupt => {
            orchestrator.interrupt().await?;
            println!("Interrupt sent.");
            Ok(())
        }
        Commands::Queue => queue(orchestrator).await,
        Commands::ClearQueue => {
            orchestrator.api().clear_queue().await?;
            println!("Queue cleared.");
            Ok(())
        }
        Commands::Workflow => show_workflow(orchestrator).await,
    }
}

async fn health(orchestrator: &JobOrchestrator) -> Result<()> {
    let health = orchestrator.service_health().await;
    println!("ComfyUI:  {}", if health.backend { "ok" } else { "unreachable" });
    println!("Workflow: {}", if health.workflow { "ok" } else { "unavailable" });
    println!("{}", health.message);

    if !(health.backend && health.workflow) {
        bail!("Service check failed");
    }
    Ok(())
}

async fn process(
    orchestrator: &JobOrchestrator,
    config: &ClientConfig,
    image: &Path,
    prompt: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let upload = load_image(image).await?;

    let result = match run_job(orchestrator, upload, prompt).await? {
        Ok(result) => result,
        Err(failure) => bail!(user_message(&failure, orchestrator.api().api_url())),
    };

    let path = match output {
        Some(path) => {
            write_file(&path, &result.image).await?;
            path
        }
        None => save_result(&config.output_dir, &result).await?,
    };

    println!(
        "Saved {} ({:.1}s, job {})",
        path.display(),
        result.elapsed.as_secs_f64(),
        result.job_id
    );
    println!("Remote copy: {}", result.locator);
    Ok(())
}

async fn queue(orchestrator: &JobOrchestrator) -> Result<()> {
    let queue = orchestrator.api().queue_status().await?;
    if queue.is_idle() {
        println!("Queue is empty.");
        return Ok(());
    }

    for id in queue.running_ids() {
        println!("running  {id}");
    }
    for id in queue.pending_ids() {
        println!("pending  {id}");
    }
    Ok(())
}

async fn show_workflow(orchestrator: &JobOrchestrator) -> Result<()> {
    let template = orchestrator.template().await?;
    let summary = template.summary();

    println!("Nodes:      {}", summary.node_count);
    println!("Inputs:     {}", summary.input_nodes.join(", "));
    println!("Outputs:    {}", summary.output_nodes.join(", "));
    println!("Processing: {}", summary.processing_nodes.join(", "));

    let report = workflow::validate(&template, &orchestrator.config().bindings);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error:   {error}");
    }

    if !report.is_ok() {
        bail!("Workflow template is not usable");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Read an image from disk after checking its type and size.
pub async fn load_image(path: &Path) -> Result<ImageUpload> {
    let mime_type = mime_type_for_path(path)
        .with_context(|| format!("Cannot tell the image type of {}", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    validate_image_file(mime_type, bytes.len())?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image.png")
        .to_string();

    Ok(ImageUpload::new(bytes, filename, mime_type))
}

/// Run one job, printing progress, and interrupt the backend on Ctrl-C.
///
/// The outer error is a local failure (Ctrl-C handling); the inner one is
/// the job's own outcome.
pub async fn run_job(
    orchestrator: &JobOrchestrator,
    upload: ImageUpload,
    prompt: &str,
) -> Result<Result<ProcessResult, ProcessFailure>> {
    let progress = |status: &JobStatus| print_progress(status);
    let request = ProcessRequest::new(upload, prompt);

    tokio::select! {
        outcome = orchestrator.process_image(request, &progress) => Ok(outcome),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Ctrl-C received, interrupting ComfyUI");
            if let Err(e) = orchestrator.interrupt().await {
                tracing::warn!(error = %e, "Failed to interrupt ComfyUI");
            }
            bail!("Interrupted")
        }
    }
}

fn print_progress(status: &JobStatus) {
    match (&status.message, status.queue_number) {
        (Some(message), Some(number)) => eprintln!("[{}] {message} (#{number})", status.state),
        (Some(message), None) => eprintln!("[{}] {message}", status.state),
        (None, _) => eprintln!("[{}]", status.state),
    }
}

/// Name for a result written to the output directory.
pub fn output_file_name(result: &ProcessResult, now: chrono::DateTime<chrono::Utc>) -> String {
    let extension = Path::new(&result.asset.filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png");
    format!("kontext-{}.{extension}", now.timestamp_millis())
}

/// Write a result into `output_dir` and return its path.
pub async fn save_result(output_dir: &Path, result: &ProcessResult) -> Result<PathBuf> {
    let path = output_dir.join(output_file_name(result, chrono::Utc::now()));
    write_file(&path, &result.image).await?;
    Ok(path)
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use kontext_comfyui::status::OutputAsset;

    fn result(filename: &str) -> ProcessResult {
        ProcessResult {
            image: b"img".to_vec(),
            locator: "http://localhost:8188/view?filename=x".into(),
            job_id: "job".into(),
            elapsed: Duration::from_secs(3),
            asset: OutputAsset {
                filename: filename.into(),
                subfolder: String::new(),
                kind: "output".into(),
            },
        }
    }

    #[test]
    fn output_name_keeps_extension() {
        let now = chrono::DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(
            output_file_name(&result("ComfyUI_00001_.webp"), now),
            "kontext-1700000000123.webp"
        );
        assert_eq!(output_file_name(&result("noext"), now), "kontext-1700000000123.png");
    }

    #[tokio::test]
    async fn save_result_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("nested/output");

        let path = save_result(&output_dir, &result("a.png")).await.unwrap();
        assert!(path.starts_with(&output_dir));
        assert_eq!(std::fs::read(&path).unwrap(), b"img");
    }

    #[tokio::test]
    async fn load_image_rejects_unsupported_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert!(load_image(&path).await.is_err());
    }

    #[tokio::test]
    async fn load_image_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::write(&path, b"").unwrap();

        let err = load_image(&path).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn load_image_reads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.PNG");
        std::fs::write(&path, b"\x89PNG....").unwrap();

        let upload = load_image(&path).await.unwrap();
        assert_eq!(upload.filename, "photo.PNG");
        assert_eq!(upload.mime_type, "image/png");
        assert_eq!(upload.bytes.len(), 8);
    }
}
