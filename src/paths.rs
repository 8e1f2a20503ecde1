//! Path resolution for patchwork
//!
//! # Environment Variables
//!
//! - `PATCHWORK_CONFIG` - Override the configuration file location
//! - `PATCHWORK_STATE_DIR` - Override the state directory (lock file and pristine snapshots)
//!
//! # Path Resolution Priority
//!
//! For config_file():
//! 1. `--config` flag
//! 2. `PATCHWORK_CONFIG` environment variable
//! 3. `patchwork.toml` in the current directory
//! 4. `patchwork/patchwork.toml` in the user config dir, when the above is missing
//!
//! Relative paths inside the configuration resolve against the directory
//! holding the configuration file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config file override
pub const ENV_CONFIG: &str = "PATCHWORK_CONFIG";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "PATCHWORK_STATE_DIR";

/// Default configuration file name
pub const CONFIG_FILE: &str = "patchwork.toml";

/// Get the configuration file path
///
/// Priority:
/// 1. `explicit` (the `--config` flag)
/// 2. `PATCHWORK_CONFIG` env var
/// 3. `./patchwork.toml`
/// 4. User config file, if `./patchwork.toml` does not exist
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return absolute(&expand(&path.to_string_lossy()));
    }

    if let Ok(file) = std::env::var(ENV_CONFIG) {
        let path = expand(&file);
        log::debug!("Using config file from {}: {}", ENV_CONFIG, path.display());
        return absolute(&path);
    }

    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    let path = cwd.join(CONFIG_FILE);
    if !path.exists()
        && let Some(user) = user_config_file().filter(|user| user.exists())
    {
        log::debug!("Using user config file: {}", user.display());
        return Ok(user);
    }

    log::debug!("Using default config file: {}", path.display());
    Ok(path)
}

/// Per-user configuration file (`~/.config/patchwork/patchwork.toml` on Linux)
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("patchwork").join(CONFIG_FILE))
}

/// State directory override from the environment, if set
pub fn state_dir_override() -> Option<PathBuf> {
    std::env::var(ENV_STATE_DIR).ok().map(|dir| {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        path
    })
}

/// Resolve a configured path against `base`
///
/// `~` and environment variables are expanded first; absolute results are
/// returned unchanged.
pub fn resolve(base: &Path, raw: &str) -> PathBuf {
    let path = expand(raw);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    Ok(cwd.join(path))
}

// ============================================================================
// Tests
// ============================================================================
