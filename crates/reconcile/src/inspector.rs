//! Per-package change detection and reset bookkeeping

use crate::types::{AppliedPatches, Package};
use std::collections::BTreeMap;

/// Whether `desired` differs from the package's applied record
///
/// Compares path → comparison key, ignoring order.
pub fn has_patch_changes(package: &Package, desired: &BTreeMap<String, String>) -> bool {
    package.applied.keys() != *desired
}

/// Clear the package's applied record
///
/// Returns whether there was anything to clear.
pub fn reset_applied_patches(package: &mut Package) -> bool {
    let had_patches = !package.applied.is_empty();
    package.applied = AppliedPatches::default();
    had_patches
}
