//! Weathervane CLI - weather image classification pipeline.
//!
//! Validate datasets, create splits, train classifiers, serve
//! predictions, and manage the model registry.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Weathervane: weather image classification pipeline
#[derive(Parser, Debug)]
#[command(name = "weathervane", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "weathervane.toml")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Validate a labeled image dataset and write report artifacts
    Validate {
        /// Dataset root with one directory per weather class
        #[arg(long)]
        data_path: PathBuf,

        /// Directory for report artifacts
        #[arg(long)]
        output_path: Option<PathBuf>,
    },
    /// Create stratified train/val/test splits
    Split {
        #[arg(long)]
        data_path: PathBuf,

        #[arg(long)]
        output_path: Option<PathBuf>,

        /// Validation fraction override
        #[arg(long)]
        val_fraction: Option<f64>,

        /// Test fraction override
        #[arg(long)]
        test_fraction: Option<f64>,

        /// RNG seed override
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Train a classifier and register the checkpoint
    Train {
        #[arg(long)]
        data_path: PathBuf,

        #[arg(long)]
        models_path: Option<PathBuf>,

        #[arg(long)]
        artifacts_path: Option<PathBuf>,

        /// Architecture: "cnn" or "cnn_lite"
        #[arg(long)]
        arch: Option<String>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        learning_rate: Option<f64>,

        #[arg(long)]
        image_size: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run the prediction server
    Serve {
        #[arg(long)]
        models_path: Option<PathBuf>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
    /// Manage registered models
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ModelsAction {
    /// List registered models
    List {
        #[arg(long)]
        models_path: Option<PathBuf>,
    },
    /// Promote the latest version of a model to production
    Promote {
        /// Registered model name
        name: String,

        #[arg(long)]
        models_path: Option<PathBuf>,
    },
    /// Show recorded pipeline runs
    Runs {
        #[arg(long)]
        artifacts_path: Option<PathBuf>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file
    Init,
    /// Print the resolved configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = weathervane_core::WeathervaneConfig::load_or_default(&cli.config)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    commands::handle_command(cli.command, &cli.config, config).await
}
