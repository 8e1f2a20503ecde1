use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{AppliedPatches, InstalledPackages};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Lock file name inside the state directory
pub const LOCK_FILE: &str = "patches.lock";

// ============================================================================
// Lock File
// ============================================================================

/// Record of the patches applied to each package
///
/// Packages without applied patches are not written.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct LockFile {
    /// Last time the record was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Applied patches per package, in application order
    #[serde(default)]
    pub packages: BTreeMap<String, AppliedPatches>,
}

impl LockFile {
    /// Get the lock file path for a state directory
    pub fn path(state_dir: &Path) -> PathBuf {
        state_dir.join(LOCK_FILE)
    }

    /// Load the lock file, or return an empty record if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Lock file does not exist, starting with an empty record");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read lock file: {}", path.display()))?;

        let lock: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse lock file: {}", path.display()))?;

        log::debug!("Loaded lock file from {}", path.display());
        Ok(lock)
    }

    /// Save the lock file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize lock file to TOML")?;

        // Stage, then rename over the previous record
        let staging = path.with_extension("lock.tmp");
        fs::write(&staging, &content)
            .with_context(|| format!("Failed to write lock file: {}", staging.display()))?;
        fs::rename(&staging, path)
            .with_context(|| format!("Failed to write lock file: {}", path.display()))?;

        log::debug!("Saved lock file to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Some(Utc::now());
        self.save(path)
    }

    /// Snapshot the applied records of installed packages
    pub fn from_packages(packages: &InstalledPackages) -> Self {
        Self {
            last_updated: None,
            packages: packages
                .iter()
                .filter(|package| !package.applied.is_empty())
                .map(|package| (package.name.clone(), package.applied.clone()))
                .collect(),
        }
    }

    /// Applied record for a package (empty when none)
    pub fn applied(&self, package: &str) -> AppliedPatches {
        self.packages.get(package).cloned().unwrap_or_default()
    }
}
