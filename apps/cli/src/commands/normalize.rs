//! Normalize command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use quicktrain_training::normalize_class_dir;
use serde_json::json;
use std::path::Path;

pub fn execute(dir: &Path, json_output: bool) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }
    let report = normalize_class_dir(dir).with_context(|| format!("Failed to normalize {}", dir.display()))?;

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "dir": dir,
                "relocated": report.relocated,
                "removed_files": report.removed_files,
                "removed_dirs": report.removed_dirs,
            }))?
        );
        return Ok(());
    }

    if report.is_noop() {
        println!("{} {}", "Already flat:".green(), dir.display());
        return Ok(());
    }
    println!("{} {}", "Normalized".bold().green(), dir.display());
    println!("  Relocated files:   {}", report.relocated);
    println!("  Removed files:     {}", report.removed_files);
    println!("  Removed dirs:      {}", report.removed_dirs);
    Ok(())
}
