//! Solmap - rooftop solar panel detection over aerial imagery.
//!
//! This crate runs a tiled classify-then-segment pipeline over georeferenced
//! GeoTIFF imagery, vectorizes the resulting masks into detection polygons
//! and joins them against building footprints and the MaStR solar registry
//! in a PostGIS store.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod inference;
pub mod join;
pub mod mask;
pub mod pipeline;
pub mod raster;
pub mod vector;

use clap::Parser;
use cli::{Cli, Command, ConfigAction};
use config::{load_config_file, save_config, Config};
use db::Store;
use inference::SolarModels;
use pipeline::ResultPaths;
use std::path::Path;

pub use error::{Error, Result};

/// Main entry point for the solmap CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let mut config = load_config_file(&cli.config)?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    config.validate()?;

    match cli.command {
        Command::Config { action } => handle_config_command(action, &cli.config, &config),
        Command::InitDb { drop_results } => {
            let store = connect(&config)?;
            store.ensure_schema(drop_results)
        }
        Command::Preprocess { imagery_dir } => {
            let store = connect(&config)?;
            let dir = imagery_dir.unwrap_or_else(|| config.paths.imagery_dir.clone());
            pipeline::run_preprocess(&store, &dir, config.tiling.stride, cli.quiet)
        }
        Command::Predict { models_dir, force } => {
            let store = connect(&config)?;
            let models_dir = models_dir.unwrap_or_else(|| config.paths.models_dir.clone());
            let mut models = SolarModels::load(&models_dir)?;
            let paths = ResultPaths::new(&config.paths.results_dir, config.tiling.stride);
            pipeline::run_predict(&store, &mut models, &paths, force, cli.quiet)
        }
        Command::Postprocess { force } => {
            let store = connect(&config)?;
            let paths = ResultPaths::new(&config.paths.results_dir, config.tiling.stride);
            pipeline::run_postprocess(&store, &paths, force, cli.quiet)
        }
        Command::Map { force } => {
            let store = connect(&config)?;
            pipeline::run_map(&store, force)
        }
    }
}

fn connect(config: &Config) -> Result<Store> {
    if config.database.url.is_empty() {
        return Err(Error::ConfigValidation {
            message: "database.url is not set (set it in the config file or via DATABASE_URL)"
                .to_string(),
        });
    }
    Store::connect(&config.database.url)
}

fn handle_config_command(action: ConfigAction, path: &Path, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Init => {
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                save_config(&Config::default(), path)?;
                println!("Created configuration file: {}", path.display());
            }
            Ok(())
        }
        ConfigAction::Show => {
            println!("{config:#?}");
            Ok(())
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    // ORT logging is suppressed by default; -v raises it alongside our own.
    let filter_str = if quiet {
        "warn,ort=off".to_string()
    } else {
        match verbose {
            0 => "info,ort=off".to_string(),
            1 => "debug,ort=warn".to_string(),
            _ => "trace,ort=info".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    fmt().with_env_filter(filter).init();
}
