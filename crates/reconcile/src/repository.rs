//! Patches repository and the installed-package store seam

use crate::error::{Error, Result};
use crate::types::{InstalledPackages, Package, PatchSet};
use std::path::PathBuf;

/// Reason passed to the store when a package is reverted
pub const RESET_REASON: &str = "Package reset due to changes in patches configuration";

/// Store of installed packages
///
/// Owns the on-disk side: where a package lives, how to get a pristine
/// copy back, and where applied records are persisted.
pub trait PackageSource {
    /// Directory holding the package's source tree
    fn install_path(&self, package: &Package) -> PathBuf;

    /// Replace the package's tree with a pristine copy
    fn reinstall(&mut self, package: &Package, reason: &str) -> anyhow::Result<()>;

    /// Persist every package's applied record
    fn persist(&mut self, packages: &InstalledPackages) -> anyhow::Result<()>;
}

/// Desired patches together with the installed packages they apply to
pub struct PatchesRepository<S: PackageSource> {
    patches: PatchSet,
    packages: InstalledPackages,
    source: S,
}

impl<S: PackageSource> PatchesRepository<S> {
    pub fn new(patches: PatchSet, packages: InstalledPackages, source: S) -> Self {
        Self {
            patches,
            packages,
            source,
        }
    }

    /// Desired patches by owner
    pub fn patches(&self) -> &PatchSet {
        &self.patches
    }

    /// Installed packages keyed by name
    pub fn targets(&self) -> &InstalledPackages {
        &self.packages
    }

    pub fn targets_mut(&mut self) -> &mut InstalledPackages {
        &mut self.packages
    }

    /// Underlying installed-package store
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Persist the current applied records
    pub fn write(&mut self) -> Result<()> {
        log::debug!("Persisting applied patches for {} packages", self.packages.len());
        self.source
            .persist(&self.packages)
            .map_err(|e| Error::Persist { source: e.into() })
    }
}
