pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable pointing directly at a configuration file
pub const CONFIG_ENV: &str = "NIMBUS_CONFIG";

/// Per-project working directory (state, lock, nested config)
pub const PROJECT_DIR: &str = ".nimbus";

const CANDIDATES: [&str; 4] = [
    "nimbus.local.kdl",
    ".nimbus.local.kdl",
    "nimbus.kdl",
    ".nimbus.kdl",
];

/// Get the Nimbus user configuration directory, creating it if needed
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("nimbus");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the project's configuration file
///
/// Search order:
/// 1. `NIMBUS_CONFIG` environment variable (direct path)
/// 2. current directory: nimbus.local.kdl, .nimbus.local.kdl, nimbus.kdl, .nimbus.kdl
/// 3. the same names inside `./.nimbus/`
/// 4. `~/.config/nimbus/nimbus.kdl` (global)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV)
        && !config_path.is_empty()
    {
        let path = PathBuf::from(&config_path);
        if path.is_file() {
            return Ok(path);
        }
        return Err(ConfigError::ExplicitPathMissing(config_path));
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_in_dir(&current_dir) {
        return Ok(path);
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = find_in_dir(&project_dir)
    {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("nimbus").join("nimbus.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Directory that holds the state file for the project owning `config_file`
///
/// A config inside `.nimbus/` keeps its state next to it.
pub fn project_state_dir(config_file: &Path) -> PathBuf {
    let parent = config_file.parent().unwrap_or_else(|| Path::new("."));
    if parent.file_name().and_then(|n| n.to_str()) == Some(PROJECT_DIR) {
        parent.to_path_buf()
    } else {
        parent.join(PROJECT_DIR)
    }
}
