//! QuickTrain Core - training job service.
//!
//! This crate provides the service around the pipeline crates, including:
//! - HTTP front door (`POST /trigger-training`)
//! - Concrete image, text and tabular backends and their fitters
//! - Configuration management
//! - Error handling
//!
//! # Example
//!
//! ```rust,no_run
//! use quicktrain_core::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> quicktrain_core::error::Result<()> {
//!     let config = Config::load()?;
//!     server::run(&config).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod runtime;
pub mod server;
pub mod training;

pub use config::Config;
pub use error::{CoreError, Result};
pub use runtime::Runtime;
pub use training::{
    build_fitter, BackendContext, CommandFitter, ImageClassifierBackend, ManifestFitter, TabularBackend,
    TextClassifierBackend,
};
