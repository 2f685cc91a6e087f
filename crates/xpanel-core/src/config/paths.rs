//! Config and data path resolution helpers.

use std::path::PathBuf;

use anyhow::Result;

/// `<config_dir>/xpanel/xpanel.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(dir.join("xpanel").join("xpanel.toml"))
}

/// `<data_local_dir>/xpanel`
pub fn default_data_dir() -> Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dir.join("xpanel"))
}
