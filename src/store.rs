//! Installed packages as directories under the vendor dir
//!
//! A package named `vendor/name` lives at `<vendor_dir>/vendor/name`.
//! Before a package is first patched its tree is copied to
//! `<state_dir>/pristine/vendor/name`; a reset copies that snapshot back,
//! unless a `reinstall_command` is configured.

use anyhow::{Context, Result};
use reconcile::{InstalledPackages, Package, PackageSource, PatchSet};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::runner;
use crate::state::LockFile;

pub struct DirectoryStore {
    vendor_dir: PathBuf,
    state_dir: PathBuf,
    reinstall_command: Option<String>,
}

impl DirectoryStore {
    pub fn new(vendor_dir: PathBuf, state_dir: PathBuf, reinstall_command: Option<String>) -> Self {
        Self {
            vendor_dir,
            state_dir,
            reinstall_command,
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        LockFile::path(&self.state_dir)
    }

    /// Where the untouched copy of a package is kept
    pub fn pristine_path(&self, name: &str) -> PathBuf {
        self.state_dir.join("pristine").join(name)
    }

    /// Installed packages in sorted order, with their applied records
    pub fn discover(&self) -> Result<InstalledPackages> {
        let lock = LockFile::load(&self.lock_path())?;

        if !self.vendor_dir.is_dir() {
            log::warn!("Vendor directory {} does not exist", self.vendor_dir.display());
            return Ok(InstalledPackages::new());
        }

        let mut packages = InstalledPackages::new();
        for entry in WalkDir::new(&self.vendor_dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| {
                format!("Failed to read vendor directory: {}", self.vendor_dir.display())
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let Some(name) = package_name(&self.vendor_dir, entry.path()) else {
                continue;
            };
            let applied = lock.applied(&name);
            packages.insert(Package::new(name).with_applied(applied));
        }

        for name in lock.packages.keys().filter(|name| !packages.contains(name)) {
            log::warn!("{name} has applied patches but is no longer installed");
        }

        log::debug!("Discovered {} installed packages", packages.len());
        Ok(packages)
    }

    /// Snapshot every unpatched package some desired patch targets
    ///
    /// Returns how many snapshots were taken.
    pub fn ensure_snapshots(&self, packages: &InstalledPackages, patches: &PatchSet) -> Result<usize> {
        let touched: BTreeSet<String> = packages
            .iter()
            .flat_map(|package| package.applied.targets())
            .collect();
        let wanted: BTreeSet<&str> = patches
            .values()
            .flatten()
            .flat_map(|patch| patch.targets.iter().map(String::as_str))
            .collect();

        let mut taken = 0;
        for name in wanted {
            let Some(package) = packages.get(name) else {
                continue;
            };
            let pristine = self.pristine_path(name);
            if pristine.exists() {
                continue;
            }
            if !package.applied.is_empty() || touched.contains(name) {
                if self.reinstall_command.is_none() {
                    log::warn!("{name} is patched but has no pristine snapshot; it cannot be reset");
                }
                continue;
            }

            copy_tree(&self.install_path(package), &pristine)
                .with_context(|| format!("Failed to snapshot {name}"))?;
            log::debug!("Snapshot of {name} saved to {}", pristine.display());
            taken += 1;
        }
        Ok(taken)
    }

    fn restore(&self, package: &Package) -> Result<()> {
        let pristine = self.pristine_path(&package.name);
        if !pristine.is_dir() {
            anyhow::bail!(
                "No pristine snapshot of {} at {}",
                package.name,
                pristine.display()
            );
        }

        let target = self.install_path(package);
        if target.exists() {
            fs::remove_dir_all(&target)
                .with_context(|| format!("Failed to remove {}", target.display()))?;
        }
        copy_tree(&pristine, &target)
    }
}

impl PackageSource for DirectoryStore {
    fn install_path(&self, package: &Package) -> PathBuf {
        self.vendor_dir.join(&package.name)
    }

    fn reinstall(&mut self, package: &Package, reason: &str) -> Result<()> {
        log::debug!("Reinstalling {}: {reason}", package.name);

        match &self.reinstall_command {
            Some(template) => {
                let install_path = self.install_path(package);
                let command_line = expand_command(template, &package.name, &install_path);
                let output = runner::run_shell(&command_line, &self.vendor_dir)
                    .with_context(|| format!("Failed to reinstall {}", package.name))?;
                if !output.is_empty() {
                    log::debug!("{output}");
                }
                Ok(())
            }
            None => self.restore(package),
        }
    }

    fn persist(&mut self, packages: &InstalledPackages) -> Result<()> {
        LockFile::from_packages(packages).touch(&self.lock_path())
    }
}

/// Substitute `{package}` and `{path}` in a reinstall command
pub fn expand_command(template: &str, package: &str, path: &Path) -> String {
    template
        .replace("{package}", package)
        .replace("{path}", &path.to_string_lossy())
}

fn package_name(vendor_dir: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(vendor_dir).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Recursively copy `from` into `to`
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .context("Walked outside of the copied tree")?;
        let dest = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("Failed to create {}", dest.display()))?;
        } else if file_type.is_symlink() {
            copy_link(entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_link(from: &Path, to: &Path) -> Result<()> {
    let link = fs::read_link(from).with_context(|| format!("Failed to read link {}", from.display()))?;
    std::os::unix::fs::symlink(&link, to)
        .with_context(|| format!("Failed to create link {}", to.display()))
}

#[cfg(not(unix))]
fn copy_link(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).with_context(|| format!("Failed to copy {}", from.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{AppliedPatch, AppliedPatches, PatchDefinition};
    use tempfile::TempDir;

    fn layout() -> (TempDir, DirectoryStore) {
        let dir = TempDir::new().unwrap();
        for (name, file) in [("acme/http", "client.php"), ("acme/log", "logger.php"), ("beta/core", "core.php")] {
            let pkg = dir.path().join("vendor").join(name);
            fs::create_dir_all(&pkg).unwrap();
            fs::write(pkg.join(file), "original\n").unwrap();
        }
        fs::write(dir.path().join("vendor").join("autoload.php"), "").unwrap();
        let store = DirectoryStore::new(dir.path().join("vendor"), dir.path().join("state"), None);
        (dir, store)
    }

    fn applied(path: &str, targets: &[&str]) -> AppliedPatches {
        AppliedPatches(vec![AppliedPatch {
            path: path.to_string(),
            hash: "h".to_string(),
            targets: targets.iter().map(|t| (*t).to_string()).collect(),
        }])
    }

    #[test]
    fn test_discover_lists_packages_sorted_with_records() {
        let (_dir, mut store) = layout();
        let mut packages = store.discover().unwrap();
        assert_eq!(packages.names(), vec!["acme/http", "acme/log", "beta/core"]);

        packages.insert(Package::new("acme/log").with_applied(applied("fix.diff", &["acme/log"])));
        store.persist(&packages).unwrap();

        let reloaded = store.discover().unwrap();
        assert_eq!(reloaded.get("acme/log").unwrap().applied.paths(), vec!["fix.diff"]);
        assert!(reloaded.get("acme/http").unwrap().applied.is_empty());
    }

    #[test]
    fn test_missing_vendor_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path().join("nope"), dir.path().join("state"), None);
        assert!(store.discover().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_then_reset_restores_tree() {
        let (_dir, mut store) = layout();
        let packages = store.discover().unwrap();
        let mut patches = PatchSet::new();
        patches.insert(
            "acme/http".to_string(),
            vec![PatchDefinition::new("acme/http", "x.diff", "h").with_targets(["acme/log"])],
        );

        assert_eq!(store.ensure_snapshots(&packages, &patches).unwrap(), 2);
        assert_eq!(store.ensure_snapshots(&packages, &patches).unwrap(), 0);

        let http = packages.get("acme/http").unwrap();
        let file = store.install_path(http).join("client.php");
        fs::write(&file, "patched\n").unwrap();
        fs::write(store.install_path(http).join("client.php.orig"), "").unwrap();

        store.reinstall(http, "test").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "original\n");
        assert!(!store.install_path(http).join("client.php.orig").exists());
    }

    #[test]
    fn test_reset_without_snapshot_fails() {
        let (_dir, mut store) = layout();
        let packages = store.discover().unwrap();
        let err = store
            .reinstall(packages.get("beta/core").unwrap(), "test")
            .unwrap_err();
        assert!(err.to_string().contains("No pristine snapshot"));
    }

    #[test]
    fn test_patched_package_is_not_snapshotted() {
        let (_dir, store) = layout();
        let mut packages = store.discover().unwrap();
        packages.insert(Package::new("acme/http").with_applied(applied("x.diff", &["acme/http"])));
        let mut patches = PatchSet::new();
        patches.insert(
            "acme/http".to_string(),
            vec![PatchDefinition::new("acme/http", "x.diff", "h")],
        );

        assert_eq!(store.ensure_snapshots(&packages, &patches).unwrap(), 0);
        assert!(!store.pristine_path("acme/http").exists());
    }

    #[test]
    fn test_expand_command() {
        let cmd = expand_command("composer reinstall {package} # {path}", "acme/http", Path::new("/v/acme/http"));
        assert_eq!(cmd, "composer reinstall acme/http # /v/acme/http");
    }

    #[cfg(unix)]
    #[test]
    fn test_reinstall_command_runs_in_vendor_dir() {
        let (dir, _) = layout();
        let mut store = DirectoryStore::new(
            dir.path().join("vendor"),
            dir.path().join("state"),
            Some("touch reinstalled-$(basename {package})".to_string()),
        );
        store.reinstall(&Package::new("acme/http"), "test").unwrap();
        assert!(dir.path().join("vendor").join("reinstalled-http").exists());
    }
}
