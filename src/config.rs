//! `patchwork.toml` loading
//!
//! ```toml
//! vendor_dir = "vendor"
//! state_dir = ".patchwork"
//! patch_command = "patch"
//! reinstall_command = "composer reinstall {package}"
//!
//! [[patch]]
//! package = "acme/http"
//! source = "patches/http-timeout.diff"
//! label = "Raise default timeout"
//!
//! [[patch]]
//! package = "acme/http"
//! source = "patches/http-and-log.diff"
//! targets = ["acme/log"]
//! level = 2
//! ```
//!
//! Patches are applied in the order they are declared for their package.

use anyhow::{Context, Result};
use reconcile::{PatchDefinition, PatchSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

fn default_vendor_dir() -> String {
    "vendor".to_string()
}

fn default_state_dir() -> String {
    ".patchwork".to_string()
}

fn default_patch_command() -> String {
    "patch".to_string()
}

const fn default_level() -> u32 {
    1
}

// ============================================================================
// File Format
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchworkConfig {
    /// Directory holding installed packages as `vendor/name`
    #[serde(default = "default_vendor_dir")]
    pub vendor_dir: String,

    /// Directory for the lock file and pristine snapshots
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Command restoring a package; `{package}` and `{path}` are substituted
    #[serde(default)]
    pub reinstall_command: Option<String>,

    /// `patch(1)` compatible executable
    #[serde(default = "default_patch_command")]
    pub patch_command: String,

    #[serde(default, rename = "patch")]
    pub patches: Vec<PatchEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchEntry {
    /// Owning package
    pub package: String,

    /// Diff file, relative to the config file
    pub source: String,

    #[serde(default)]
    pub label: Option<String>,

    /// Other packages the diff modifies
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default = "default_level")]
    pub level: u32,
}

impl PatchworkConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid patchwork.toml format")
    }
}

// ============================================================================
// Loaded Project
// ============================================================================

/// Configuration together with the directory it was loaded from
#[derive(Debug, Clone)]
pub struct Project {
    pub config_path: PathBuf,
    pub root: PathBuf,
    pub config: PatchworkConfig,
}

impl Project {
    /// Load the configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = PatchworkConfig::parse(&content)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        log::debug!(
            "Loaded {} patch definitions from {}",
            config.patches.len(),
            path.display()
        );

        Ok(Self {
            config_path: path.to_path_buf(),
            root,
            config,
        })
    }

    pub fn vendor_dir(&self) -> PathBuf {
        paths::resolve(&self.root, &self.config.vendor_dir)
    }

    pub fn state_dir(&self) -> PathBuf {
        paths::state_dir_override().unwrap_or_else(|| paths::resolve(&self.root, &self.config.state_dir))
    }

    /// Desired patches per owning package, in declaration order
    ///
    /// Each patch targets its owner first, then any declared extra targets.
    /// The comparison key covers the diff body and the strip level.
    pub fn desired_patches(&self) -> Result<PatchSet> {
        let mut set = PatchSet::new();
        let mut seen = HashSet::new();

        for entry in &self.config.patches {
            if !seen.insert((entry.package.as_str(), entry.source.as_str())) {
                anyhow::bail!(
                    "Patch {} is declared twice for {}",
                    entry.source,
                    entry.package
                );
            }

            let source = paths::resolve(&self.root, &entry.source);
            let body = fs::read(&source).with_context(|| {
                format!(
                    "Could not read patch {} for {}",
                    source.display(),
                    entry.package
                )
            })?;

            let mut patch = PatchDefinition::new(
                entry.package.as_str(),
                entry.source.as_str(),
                content_hash(&body, entry.level),
            )
            .with_targets(entry.targets.iter().map(String::as_str));
            patch.source = source;
            patch.label = entry.label.clone();
            patch.level = entry.level;

            set.entry(entry.package.clone()).or_default().push(patch);
        }

        Ok(set)
    }
}

/// blake3 over the strip level and the diff body
pub fn content_hash(body: &[u8], level: u32) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&level.to_le_bytes());
    hasher.update(body);
    hasher.finalize().to_hex().to_string()
}
