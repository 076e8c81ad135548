//! Configuration: keystone.toml loading and command-line overlays.

pub mod parser;
pub mod schema;

use std::path::{Path, PathBuf};

pub use schema::{
    ConfigOverrides, DeployConfig, DeployerConfig, NetworkConfig, PathsConfig, PollingConfig,
    ReuseConfig,
};

/// Default config location: `<config dir>/keystone/keystone.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(base.join("keystone").join("keystone.toml"))
}

/// Load configuration from `path`; a missing file yields the defaults.
pub fn load_config(path: &Path) -> anyhow::Result<DeployConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(DeployConfig::new());
    }
    parser::parse_config(path)
}
