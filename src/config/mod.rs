//! Configuration loading and management.

mod file;
mod types;

pub use file::{load_config_file, save_config};
pub use types::{Config, DatabaseConfig, PathsConfig, TilingConfig};
