//! Interactive editing session.
//!
//! Each line read from stdin is either a `:command` or an edit prompt that
//! is applied to the current image. Results become the current image and
//! are added to the history, so prompts can be chained.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use kontext_core::app_state::{AppState, HistoryEntry, ImageRecord};
use kontext_core::image::image_dimensions;
use kontext_pipeline::orchestrator::JobOrchestrator;

use crate::commands::{load_image, run_job, save_result};
use crate::config::ClientConfig;
use crate::messages::user_message;

/// One parsed line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Empty,
    Prompt(String),
    History,
    /// 1-based position in the history list.
    Switch(usize),
    Clear,
    Quit,
    Unknown(String),
}

pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix(':') else {
        return Input::Prompt(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("history" | "h"), None) => Input::History,
        (Some("switch" | "s"), Some(n)) => match n.parse() {
            Ok(n) if n > 0 => Input::Switch(n),
            _ => Input::Unknown(line.to_string()),
        },
        (Some("clear"), None) => Input::Clear,
        (Some("quit" | "q" | "exit"), None) => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

/// Make the `n`th history entry (1-based, newest first) current.
pub fn switch_to(state: &mut AppState, n: usize) -> Result<(), String> {
    let id = n
        .checked_sub(1)
        .and_then(|i| state.history().get(i))
        .map(|entry| entry.id)
        .ok_or_else(|| format!("No history entry {n}, there are {}", state.history().len()))?;
    state.switch_to_history_item(id);
    Ok(())
}

pub async fn run(orchestrator: &JobOrchestrator, config: &ClientConfig, image: &Path) -> Result<()> {
    let mut state = AppState::new();

    state.set_loading(true);
    let upload = load_image(image).await?;
    let record = ImageRecord::new(image.display().to_string())
        .with_source_file(upload.filename.clone())
        .with_dimensions(image_dimensions(&upload.bytes));
    state.set_current_image(Some(record));
    state.set_loading(false);

    if let Err(e) = orchestrator.initialize().await {
        eprintln!("warning: {e}");
    }

    println!("Editing {}. Type a prompt, or :history, :switch <n>, :clear, :quit", image.display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_line(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::History => print_history(&state),
            Input::Switch(n) => match switch_to(&mut state, n) {
                Ok(()) => println!("Switched to: {}", state.current_prompt()),
                Err(message) => println!("{message}"),
            },
            Input::Clear => {
                state.clear_history();
                println!("History cleared.");
            }
            Input::Unknown(input) => println!("Unknown command: {input}"),
            Input::Prompt(prompt) => apply_prompt(orchestrator, config, &mut state, prompt).await?,
        }
    }

    Ok(())
}

async fn apply_prompt(
    orchestrator: &JobOrchestrator,
    config: &ClientConfig,
    state: &mut AppState,
    prompt: String,
) -> Result<()> {
    let Some(current) = state.current_image().cloned() else {
        println!("No current image.");
        return Ok(());
    };

    state.set_current_prompt(prompt.clone());
    state.clear_error();
    state.set_processing(true);

    let upload = load_image(Path::new(&current.locator)).await;
    let outcome = match upload {
        Ok(upload) => run_job(orchestrator, upload, &prompt).await,
        Err(e) => Err(e),
    };
    state.set_processing(false);

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("{e:#}");
            state.set_error(Some(e.to_string()));
            return Ok(());
        }
    };

    match outcome {
        Ok(result) => {
            let path = save_result(&config.output_dir, &result).await?;
            let record = ImageRecord::new(path.display().to_string())
                .with_source_file(result.asset.filename.clone())
                .with_prompt(prompt.clone())
                .with_dimensions(image_dimensions(&result.image));
            state.set_current_image(Some(record.clone()));
            state.add_to_history(HistoryEntry::new(record, prompt));
            println!("Saved {} ({:.1}s)", path.display(), result.elapsed.as_secs_f64());
        }
        Err(failure) => {
            let message = user_message(&failure, orchestrator.api().api_url());
            println!("{message}");
            state.set_error(Some(message));
        }
    }
    Ok(())
}

fn print_history(state: &AppState) {
    if state.history().is_empty() {
        println!("No edits yet.");
        return;
    }
    for (i, entry) in state.history().iter().enumerate() {
        println!(
            "{:>2}. [{}] {}  ->  {}",
            i + 1,
            entry.timestamp.format("%H:%M:%S"),
            entry.prompt,
            entry.image.locator
        );
    }
}
