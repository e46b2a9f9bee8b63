//! CLI argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rooftop solar panel detection over aerial imagery.
#[derive(Debug, Parser)]
#[command(name = "solmap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline stage to run.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(short, long, default_value = "solmap.toml", env = "SOLMAP_CONFIG")]
    pub config: PathBuf,

    /// Database connection URL (overrides config).
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Suppress progress output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands, one per pipeline stage plus housekeeping.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the result schemas and tables.
    InitDb {
        /// Drop and recreate existing result tables.
        #[arg(long)]
        drop_results: bool,
    },
    /// Register imagery and its tile windows in the database.
    Preprocess {
        /// Directory scanned for GeoTIFF imagery (overrides config).
        #[arg(long)]
        imagery_dir: Option<PathBuf>,
    },
    /// Run classify-then-segment inference and write prediction masks.
    Predict {
        /// Directory holding the ONNX models (overrides config).
        #[arg(long)]
        models_dir: Option<PathBuf>,
        /// Recompute masks even if output already exists.
        #[arg(long)]
        force: bool,
    },
    /// Vectorize prediction masks into detection polygons.
    Postprocess {
        /// Re-extract detections even if some are already stored.
        #[arg(long)]
        force: bool,
    },
    /// Join detections to buildings and registered solar units.
    Map {
        /// Recompute mapping tables even if already populated.
        #[arg(long)]
        force: bool,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Write a default configuration file.
    Init,
    /// Display the effective configuration.
    Show,
}
