//! Configuration module for QuickTrain Core.
//!
//! Settings come from a TOML file (`$QUICKTRAIN_CONFIG`, else `./quicktrain.toml`,
//! else built-in defaults) and are then overridden by environment variables.

use crate::error::{CoreError, Result};
use quicktrain_storage::{StoreConfig, StoreKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "QUICKTRAIN_CONFIG";
/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "quicktrain.toml";

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 10000))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: default_address() }
    }
}

/// Object store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreKind,
    /// Bucket directory for the local backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub service_key: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

fn default_backend() -> StoreKind {
    StoreKind::Local
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("bucket")
}

fn default_bucket() -> String {
    "images-bucket".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_storage_root(),
            url: None,
            service_key: None,
            bucket: default_bucket(),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            kind: self.backend,
            root: self.root.clone(),
            url: self.url.clone(),
            service_key: self.service_key.clone(),
            bucket: self.bucket.clone(),
        }
    }
}

/// Job worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Parent of every job's working directory.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Leave job directories on disk after the job ends.
    #[serde(default)]
    pub keep_workdirs: bool,
    /// Seed for the validation auto-split; random when unset.
    #[serde(default)]
    pub split_seed: Option<u64>,
    /// Lifetime of the signed URL issued for a published model; none when unset.
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: Option<u64>,
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("quicktrain")
}

fn default_queue_capacity() -> usize {
    quicktrain_orchestrator::DEFAULT_QUEUE_CAPACITY
}

fn default_max_concurrent_jobs() -> usize {
    2
}

#[allow(clippy::unnecessary_wraps)]
fn default_signed_url_ttl() -> Option<u64> {
    Some(3600)
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            queue_capacity: default_queue_capacity(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            keep_workdirs: false,
            split_seed: None,
            signed_url_ttl_secs: default_signed_url_ttl(),
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn signed_url_ttl(&self) -> Option<Duration> {
        self.signed_url_ttl_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

/// Which fitter turns prepared datasets into models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitterKind {
    /// Writes a dataset manifest as the artifact.
    #[default]
    Manifest,
    /// Runs a configured external program per model type.
    Command,
}

/// Fitter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FitterConfig {
    #[serde(default)]
    pub kind: FitterKind,
    /// Program and arguments per model type, e.g. `ebm = ["python", "fit_ebm.py", "{dataset}", "{output}"]`.
    #[serde(default)]
    pub commands: HashMap<String, Vec<String>>,
}

/// Root configuration for QuickTrain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub fitter: FitterConfig,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the config file and process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or an
    /// override has an invalid value.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), reading variables through `lookup`.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env_overrides(lookup)?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading config file");
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `SUPABASE_URL` / `SUPABASE_SERVICE_ROLE_KEY` (both switch storage to
    /// Supabase), `QUICKTRAIN_ADDRESS`, `QUICKTRAIN_WORK_ROOT` and `QUICKTRAIN_BUCKET`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let (Some(url), Some(key)) = (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            self.storage.backend = StoreKind::Supabase;
            self.storage.url = Some(url);
            self.storage.service_key = Some(key);
        }
        if let Some(address) = get("QUICKTRAIN_ADDRESS") {
            self.server.address = address.trim().parse()?;
        }
        if let Some(root) = get("QUICKTRAIN_WORK_ROOT") {
            self.worker.work_root = PathBuf::from(root);
        }
        if let Some(bucket) = get("QUICKTRAIN_BUCKET") {
            self.storage.bucket = bucket;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.address, "0.0.0.0:10000".parse().unwrap());
        assert_eq!(config.storage.backend, StoreKind::Local);
        assert_eq!(config.storage.bucket, "images-bucket");
        assert_eq!(config.worker.signed_url_ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(config.fitter.kind, FitterKind::Manifest);
    }

    #[test]
    fn test_config_deserialize_full() {
        let config = Config::from_toml_str(
            r#"
            [server]
            address = "127.0.0.1:8080"

            [storage]
            backend = "supabase"
            url = "https://example.supabase.co"
            service_key = "key"
            bucket = "datasets"

            [worker]
            work_root = "/var/lib/quicktrain"
            queue_capacity = 8
            max_concurrent_jobs = 1
            keep_workdirs = true
            split_seed = 42
            signed_url_ttl_secs = 0

            [fitter]
            kind = "command"
            commands = { ebm = ["python", "fit.py", "{dataset}", "{output}"] }
            "#,
        )
        .unwrap();

        assert_eq!(config.server.address, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.storage.store_config().kind, StoreKind::Supabase);
        assert_eq!(config.storage.bucket, "datasets");
        assert_eq!(config.worker.queue_capacity, 8);
        assert_eq!(config.worker.split_seed, Some(42));
        assert_eq!(config.worker.signed_url_ttl(), None);
        assert_eq!(config.fitter.kind, FitterKind::Command);
        assert_eq!(config.fitter.commands["ebm"][1], "fit.py");
    }

    #[test]
    fn test_config_deserialize_minimal() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.worker.max_concurrent_jobs, 2);
        assert!(!config.worker.keep_workdirs);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(matches!(Config::from_toml_str("[server"), Err(CoreError::ConfigParse(_))));
    }

    #[test]
    fn test_supabase_override_needs_both_variables() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("SUPABASE_URL", "https://x.supabase.co")])).unwrap();
        assert_eq!(config.storage.backend, StoreKind::Local);

        config
            .apply_env_overrides(env(&[
                ("SUPABASE_URL", "https://x.supabase.co"),
                ("SUPABASE_SERVICE_ROLE_KEY", "secret"),
            ]))
            .unwrap();
        assert_eq!(config.storage.backend, StoreKind::Supabase);
        assert_eq!(config.storage.service_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                ("QUICKTRAIN_ADDRESS", "127.0.0.1:9000"),
                ("QUICKTRAIN_WORK_ROOT", "/tmp/qt"),
                ("QUICKTRAIN_BUCKET", "other"),
            ]))
            .unwrap();
        assert_eq!(config.server.address, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.worker.work_root, PathBuf::from("/tmp/qt"));
        assert_eq!(config.storage.bucket, "other");

        let err = config.apply_env_overrides(env(&[("QUICKTRAIN_ADDRESS", "nope")])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAddress(_)));
    }

    #[test]
    fn test_load_with_explicit_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("qt.toml");
        std::fs::write(&path, "[storage]\nbucket = \"from-file\"\n").unwrap();

        let path_str = path.to_string_lossy().into_owned();
        let config = Config::load_with(env(&[(CONFIG_PATH_ENV, path_str.as_str())])).unwrap();
        assert_eq!(config.storage.bucket, "from-file");

        let missing = Config::load_with(env(&[(CONFIG_PATH_ENV, "/nonexistent/qt.toml")]));
        assert!(matches!(missing, Err(CoreError::Config(_))));
    }
}
