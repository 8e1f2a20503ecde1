//! Patch list simplification and post-run sanitation

use crate::error::{Error, Result};
use crate::repository::PackageSource;
use crate::types::{InstalledPackages, PatchQueue, PatchSet};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions `patch` leaves behind for rejected or backed-up hunks
const STRAY_EXTENSIONS: [&str; 2] = ["rej", "orig"];

/// Project full definitions down to owner → path → comparison key
pub fn create_simplified_list(patches: &PatchSet) -> PatchQueue {
    patches
        .iter()
        .filter(|(_, list)| !list.is_empty())
        .map(|(owner, list)| {
            let keys = list
                .iter()
                .map(|patch| (patch.path.clone(), patch.hash.clone()))
                .collect();
            (owner.clone(), keys)
        })
        .collect()
}

/// Reject/backup files already present under the targets of `patches`
///
/// Taken before a pass so that files a package ships with these extensions
/// are left alone by [`sanitize_file_system`].
pub fn collect_stray_files<S: PackageSource>(
    patches: &PatchSet,
    packages: &InstalledPackages,
    source: &S,
) -> BTreeSet<PathBuf> {
    target_roots(patches, packages, source)
        .iter()
        .flat_map(|root| stray_files(root))
        .collect()
}

/// Remove artifacts the patch engine left behind
///
/// Deletes reject/backup files under every installed target of `patches`
/// unless they are listed in `keep`. Returns how many files were removed.
pub fn sanitize_file_system<S: PackageSource>(
    patches: &PatchSet,
    packages: &InstalledPackages,
    source: &S,
    keep: &BTreeSet<PathBuf>,
) -> Result<usize> {
    let mut removed = 0;
    for root in target_roots(patches, packages, source) {
        for path in stray_files(&root).into_iter().filter(|path| !keep.contains(path)) {
            remove(&path)?;
            removed += 1;
        }
    }

    if removed > 0 {
        log::debug!("Removed {removed} leftover patch artifacts");
    }
    Ok(removed)
}

fn target_roots<S: PackageSource>(
    patches: &PatchSet,
    packages: &InstalledPackages,
    source: &S,
) -> Vec<PathBuf> {
    let targets: BTreeSet<&str> = patches
        .values()
        .flatten()
        .flat_map(|patch| patch.targets.iter().map(String::as_str))
        .collect();

    targets
        .into_iter()
        .filter_map(|name| packages.get(name))
        .map(|package| source.install_path(package))
        .filter(|root| root.is_dir())
        .collect()
}

fn stray_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| STRAY_EXTENSIONS.contains(&ext))
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn remove(path: &Path) -> Result<()> {
    log::trace!("Removing {}", path.display());
    fs::remove_file(path).map_err(|source| Error::Sanitize {
        path: path.to_path_buf(),
        source,
    })
}
