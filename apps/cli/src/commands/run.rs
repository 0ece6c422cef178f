//! Run command implementation.
//!
//! Builds the same runtime `serve` does, dispatches one request, and follows the
//! job's events until it reaches a terminal state.

use anyhow::{Context, Result};
use colored::Colorize;
use quicktrain_core::Runtime;
use quicktrain_orchestrator::JobEvent;
use quicktrain_training::{ProgressEvent, TrainingRequest};
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;

pub async fn execute(config_path: Option<&Path>, request_path: &Path, json_output: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let body = std::fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read request file {}", request_path.display()))?;
    let request: TrainingRequest = serde_json::from_str(&body).context("Request file is not a valid training request")?;

    let mut runtime = Runtime::build(&config)?;
    let mut events = runtime.subscribe();
    runtime.start()?;

    let ack = runtime.dispatcher().dispatch(&request)?;
    if !json_output {
        println!();
        println!("{}", ack.message.bold());
        println!("  Model type: {}", ack.model_type.cyan());
    }

    let outcome = loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Missed job events");
                continue;
            }
            Err(RecvError::Closed) => anyhow::bail!("Job worker stopped before the job finished"),
        };
        if event.job_id() != ack.job_id {
            continue;
        }
        if !json_output {
            render(&event);
        }
        if event.is_terminal() {
            break event;
        }
    };
    runtime.stop()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    match outcome {
        JobEvent::Completed { .. } => Ok(()),
        JobEvent::Failed { error, .. } => anyhow::bail!("Job {} failed: {}", ack.job_id, error),
        JobEvent::TimedOut { timeout_secs, .. } => {
            anyhow::bail!("Job {} timed out after {}s", ack.job_id, timeout_secs)
        }
        JobEvent::Started { .. } | JobEvent::Progress { .. } => Ok(()),
    }
}

fn render(event: &JobEvent) {
    match event {
        JobEvent::Started { .. } => println!("  {}", "Started".dimmed()),
        JobEvent::Progress { event: ProgressEvent::Stage { stage, .. }, .. } => {
            println!("  {} {:?}", "Stage".dimmed(), stage);
        }
        JobEvent::Progress { event: ProgressEvent::Message { message, .. }, .. } => {
            println!("  {}", message.dimmed());
        }
        JobEvent::Completed { artifact, .. } => {
            println!();
            println!("{}", "Training complete".bold().green());
            println!("  Model:  {}", artifact.key.cyan());
            println!("  Size:   {} bytes", artifact.size_bytes);
            println!("  SHA256: {}", artifact.sha256.dimmed());
            if let Some(url) = &artifact.signed_url {
                println!("  URL:    {}", url);
            }
            println!();
        }
        JobEvent::Failed { error, .. } => println!("{} {}", "Failed:".bold().red(), error),
        JobEvent::TimedOut { timeout_secs, .. } => {
            println!("{} after {}s", "Timed out".bold().red(), timeout_secs);
        }
    }
}
