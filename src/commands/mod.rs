pub mod backtest;
pub mod segments;

use anyhow::{Context, Result};
use grid_backtest::Config;
use tracing::info;

/// Load the config file, or defaults plus environment overrides when none is given
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => {
            let config = Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path))?;
            info!("Loaded configuration from: {}", path);
            Ok(config)
        }
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            info!("No configuration file given, using defaults");
            Ok(config)
        }
    }
}
