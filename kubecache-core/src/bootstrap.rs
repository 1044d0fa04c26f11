//! Startup helpers shared by processes embedding a selector

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "KUBECACHE_CONFIG_PATH";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "kubecache.toml";

/// Load and validate configuration.
///
/// Config file search order:
/// 1. `path`, when given
/// 2. `KUBECACHE_CONFIG_PATH`
/// 3. `./kubecache.toml`
///
/// Environment variables override file values either way. Every validation
/// problem is logged and the load fails if there is at least one.
pub fn load_config(path: Option<&str>) -> Result<Config> {
    let config_path = path
        .map(str::to_string)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .or_else(|| Path::new(DEFAULT_CONFIG_FILE).exists().then(|| DEFAULT_CONFIG_FILE.to_string()));

    if let Some(path) = &config_path {
        if !Path::new(path).exists() {
            return Err(anyhow::anyhow!("Config file {path} does not exist"));
        }
    }

    let config = Config::load(config_path.as_deref())?;

    if let Err(errors) = config.validate() {
        for error in &errors {
            tracing::error!("Config validation error: {}", error);
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    tracing::info!(target = %config.selector.target, "Configuration loaded and validated");
    Ok(config)
}
