//! Patch engine and progress traits
//!
//! These traits keep the reconciliation engine independent of how patches
//! are actually applied and how progress is shown.

use crate::status::PatchStatus;
use crate::types::{Package, PatchDefinition};
use std::path::Path;

/// Failure reported by a [`PatchApplier`]
#[derive(Debug)]
pub struct PatchFailure {
    /// Path of the first patch that did not apply
    pub path: String,
    pub error: anyhow::Error,
}

impl PatchFailure {
    pub fn new(path: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// Applies an ordered list of patches to one package's source tree
///
/// Implementations must apply in the given order and stop at the first
/// patch that fails, reporting its path. Patches before it stay applied.
pub trait PatchApplier {
    fn apply_patches(
        &mut self,
        package: &Package,
        install_path: &Path,
        patches: &[PatchDefinition],
    ) -> Result<(), PatchFailure>;
}

/// Progress callback for reconciliation
///
/// Implement this trait to render what the engine is doing.
pub trait ProgressCallback {
    /// A package is about to be reverted to its pristine state
    fn on_reset(&mut self, package: &str, announce: bool);

    /// Patches are about to be applied to a package
    fn on_apply_start(&mut self, package: &str, count: usize);

    /// Reconciliation outcome of one patch
    fn on_patch_status(&mut self, package: &str, path: &str, status: PatchStatus);

    /// Patch application for a package finished (successfully or not)
    fn on_apply_complete(&mut self, package: &str, success: bool);

    /// The pass finished; `changed` is false when nothing was patched
    fn on_finish(&mut self, changed: bool);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_reset(&mut self, _package: &str, _announce: bool) {}
    fn on_apply_start(&mut self, _package: &str, _count: usize) {}
    fn on_patch_status(&mut self, _package: &str, _path: &str, _status: PatchStatus) {}
    fn on_apply_complete(&mut self, _package: &str, _success: bool) {}
    fn on_finish(&mut self, _changed: bool) {}
}
