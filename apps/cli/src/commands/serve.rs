//! Serve command implementation.

use anyhow::Result;
use colored::Colorize;
use quicktrain_core::server;
use std::path::Path;

pub async fn execute(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;

    println!(
        "{} {}",
        "QuickTrain listening on".bold().green(),
        format!("http://{}", config.server.address).cyan()
    );
    println!("  Storage: {}", format!("{:?}", config.storage.backend).to_lowercase().dimmed());
    println!("  Work root: {}", config.worker.work_root.display().to_string().dimmed());
    println!();

    server::run(&config).await?;
    Ok(())
}
