//! Error types for QuickTrain Core.

use quicktrain_abstraction::StorageError;
use quicktrain_orchestrator::RegistryError;
use thiserror::Error;

/// Core error type for QuickTrain operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config file parse errors
    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Backend registration errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Job worker lifecycle errors
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias for QuickTrain core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
