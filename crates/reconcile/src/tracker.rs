//! Applied-patch bookkeeping
//!
//! The record on each [`Package`](crate::types::Package) is the single
//! source of truth for what previous runs left on disk.

use crate::types::{AppliedPatch, AppliedPatches, InstalledPackages, PatchSet};

/// Replace the applied record of every owner named in `applied`
///
/// Lists may be empty or a prefix of the desired list. Owners that are
/// not installed are skipped.
pub fn register_applied_patches(packages: &mut InstalledPackages, applied: &PatchSet) {
    for (owner, patches) in applied {
        let Some(package) = packages.get_mut(owner) else {
            log::warn!("Cannot record patches for {owner}: package is not installed");
            continue;
        };
        package.applied = AppliedPatches(patches.iter().map(AppliedPatch::from).collect());
        log::debug!("Recorded {} applied patches for {owner}", patches.len());
    }
}
