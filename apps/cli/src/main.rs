//! QuickTrain CLI - Command-line interface for the QuickTrain training service
//!
//! This CLI provides a `qt` command for running the HTTP front door, executing
//! one training request locally, and inspecting the built-in backends.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, shells};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// QuickTrain CLI - Train image, text and tabular models from uploaded archives
#[derive(Parser, Debug)]
#[command(
    name = "qt",
    author,
    version,
    about = "QuickTrain - train and publish models from stored datasets",
    long_about = "QuickTrain (qt) accepts training requests, assembles datasets from object storage,\nruns the backend for the requested model type and publishes the resulting model."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Config file (overrides QUICKTRAIN_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP front door and job worker
    Serve,

    /// Run one training request to completion
    ///
    /// Dispatches the request exactly as the HTTP front door would, then waits for
    /// the job to complete, fail or time out.
    Run {
        /// JSON file holding the request (`jobId`, `modelType`, `trainFile1`, ...)
        #[arg(short, long)]
        request: PathBuf,

        /// Print the final job event as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the registered backends and their parameter contracts
    Backends {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Flatten a class directory in place
    Normalize {
        /// Directory to flatten
        dir: PathBuf,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(shell) = std::env::var("QT_GENERATE_COMPLETIONS") {
        let mut cmd = Args::command();
        match shell.as_str() {
            "bash" => generate(shells::Bash, &mut cmd, "qt", &mut std::io::stdout()),
            "zsh" => generate(shells::Zsh, &mut cmd, "qt", &mut std::io::stdout()),
            "fish" => generate(shells::Fish, &mut cmd, "qt", &mut std::io::stdout()),
            _ => anyhow::bail!("Unknown shell: {}. Supported: bash, zsh, fish", shell),
        }
        return Ok(());
    }

    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    // Logs go to stderr so `--json` output stays parseable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Serve => commands::serve::execute(args.config.as_deref()).await,
        Command::Run { request, json } => commands::run::execute(args.config.as_deref(), &request, json).await,
        Command::Backends { json } => commands::backends::execute(json),
        Command::Normalize { dir, json } => commands::normalize::execute(&dir, json),
    }
}
