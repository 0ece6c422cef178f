//! Command implementations for the QuickTrain CLI.

pub mod backends;
pub mod normalize;
pub mod run;
pub mod serve;

use anyhow::{Context, Result};
use quicktrain_core::Config;
use std::path::Path;

/// Loads configuration from `path` when given, otherwise the usual lookup.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => Config::load().context("Failed to load configuration"),
    }
}
