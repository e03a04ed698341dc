//! Effective settings for one invocation.
//!
//! The configuration file lives at `~/.config/shellcache/config.json` unless
//! `--config` names another one; stores default to `~/.cache/shellcache/`.
//! A missing configuration file means the built-in defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use shellcache_core::CoordinatorConfig;
use tracing::debug;

use crate::cli::Cli;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub fn config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(ref path) = cli.config {
        return Ok(path.clone());
    }
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
    Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
}

pub fn store_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(ref dir) = cli.store_dir {
        return Ok(dir.clone());
    }
    let cache_dir =
        dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
    Ok(cache_dir.join(APP_NAME))
}

pub fn load_config(cli: &Cli) -> Result<CoordinatorConfig> {
    let path = config_path(cli)?;
    let mut config = if path.exists() {
        debug!(path = %path.display(), "Loading configuration");
        CoordinatorConfig::load_from(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?
    } else {
        debug!(path = %path.display(), "No configuration file, using defaults");
        CoordinatorConfig::default()
    };

    if let Some(ref tag) = cli.version_tag {
        config.version = tag.clone();
    }
    Ok(config)
}
