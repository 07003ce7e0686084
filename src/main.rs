//! CNN Trainer CLI
//!
//! Trains an image classifier from a TOML configuration, optionally
//! overriding the most commonly changed settings from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use cnn_trainer::backend::{backend_name, Session, TrainingBackend};
use cnn_trainer::config::{load_toml_config, TrainingConfig};
use cnn_trainer::training::train_image_classification_model;
use cnn_trainer::utils::format_duration;
use cnn_trainer::utils::logging::{init_logging, LogConfig, LogLevel};

/// Convolutional image classifier training with Burn
#[derive(Parser, Debug)]
#[command(name = "cnn-trainer")]
#[command(version)]
#[command(about = "Train cyclic, model-zoo and transfer-learning image classifiers", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, conflicts_with = "verbose")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that may override the configuration file
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Architecture tag, e.g. base_cyclic or resnet18_tl
    #[arg(short, long)]
    architecture: Option<String>,

    /// Directory of class subdirectories
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Parent directory of the run's output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum number of epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut TrainingConfig) {
        if let Some(architecture) = self.architecture {
            config.model.architecture = architecture;
        }
        if let Some(input) = self.input {
            config.data.input_source = input;
        }
        if let Some(output) = self.output {
            config.output.output_dir = output;
        }
        if let Some(epochs) = self.epochs {
            config.training.max_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train, evaluate and save a model
    Train {
        /// TOML configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration as TOML
    ShowConfig {
        /// TOML configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if let Some(level) = &cli.log_level {
        LogConfig {
            level: LogLevel::parse(level),
            ..LogConfig::default()
        }
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train { config, overrides } => {
            print_banner();
            let config = resolve_config(config, overrides)?;
            cmd_train(&config)?;
        }
        Commands::ShowConfig { config, overrides } => {
            let config = resolve_config(config, overrides)?;
            let text = toml::to_string_pretty(&config).context("Failed to serialise configuration")?;
            println!("{}", text);
        }
    }

    Ok(())
}

fn resolve_config(path: Option<PathBuf>, overrides: Overrides) -> Result<TrainingConfig> {
    let mut config = match path {
        Some(path) => load_toml_config::<TrainingConfig>(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => TrainingConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    info!("Backend: {}", backend_name());
    info!(
        "Training '{}' ({}) on {}",
        config.name,
        config.model.architecture,
        config.data.input_source.display()
    );

    let session = Session::<TrainingBackend>::with_default_device(config.seed);
    let outcome = train_image_classification_model(config, None, &session).context("Training failed")?;
    let result = &outcome.result;

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Epochs:      {}", result.epochs_run());
    println!("  Train time:  {}", format_duration(result.training_time));
    if result.y_true.is_empty() {
        println!("  {}", "No test split, metrics not available".yellow());
    } else {
        println!("  Accuracy:    {:.2}%", result.accuracy * 100.0);
        println!("  Macro F1:    {:.2}%", result.mean_f1 * 100.0);
    }
    println!("  Inference:   {:.3} ms/image", result.inference_time_per_image);
    println!("  Output:      {}", outcome.save_dir.display().to_string().cyan());

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════╗
 ║   CNN Trainer                                    ║
 ║   Image classification with Burn + Rust          ║
 ╚══════════════════════════════════════════════════╝
  "#
        .green()
    );
}
