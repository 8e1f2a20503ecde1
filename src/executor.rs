//! Applies patches with `patch(1)`
//!
//! Every patch is first tried with `--dry-run`, so a patch that does not
//! apply cleanly leaves the tree untouched.

use anyhow::Context;
use reconcile::{Package, PatchApplier, PatchDefinition, PatchFailure};
use std::path::{Path, PathBuf};

use crate::runner;

pub struct CommandApplier {
    patch_command: String,
    vendor_dir: PathBuf,
    applied: usize,
}

impl CommandApplier {
    pub fn new(patch_command: impl Into<String>, vendor_dir: PathBuf) -> Self {
        Self {
            patch_command: patch_command.into(),
            vendor_dir,
            applied: 0,
        }
    }

    /// Patches applied since creation
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Directory a patch is applied from
    ///
    /// Patches touching several packages carry paths relative to the vendor
    /// dir; single-package patches are relative to the package.
    pub fn working_dir<'a>(&'a self, patch: &PatchDefinition, install_path: &'a Path) -> &'a Path {
        if patch.targets.len() > 1 {
            &self.vendor_dir
        } else {
            install_path
        }
    }

    fn run(&self, patch: &PatchDefinition, dir: &Path) -> anyhow::Result<()> {
        let check = patch_args(patch, dir, true);
        runner::run_capture(&self.patch_command, &check)
            .with_context(|| format!("{} does not apply cleanly", patch.display_name()))?;

        let output = runner::run_capture(&self.patch_command, &patch_args(patch, dir, false))
            .with_context(|| format!("Failed to apply {}", patch.display_name()))?;
        if !output.is_empty() {
            log::debug!("{output}");
        }
        Ok(())
    }
}

impl PatchApplier for CommandApplier {
    fn apply_patches(
        &mut self,
        package: &Package,
        install_path: &Path,
        patches: &[PatchDefinition],
    ) -> Result<(), PatchFailure> {
        for patch in patches {
            let dir = self.working_dir(patch, install_path);
            log::debug!(
                "Applying {} to {} in {}",
                patch.path,
                package.name,
                dir.display()
            );
            if let Err(e) = self.run(patch, dir) {
                return Err(PatchFailure::new(patch.path.clone(), e));
            }
            self.applied += 1;
        }
        Ok(())
    }
}

/// Arguments for one `patch` invocation
pub fn patch_args(patch: &PatchDefinition, dir: &Path, dry_run: bool) -> Vec<String> {
    let mut args = vec![
        format!("-p{}", patch.level),
        "--forward".to_string(),
        "--batch".to_string(),
    ];
    if dry_run {
        args.push("--dry-run".to_string());
    }
    args.extend([
        "-d".to_string(),
        dir.to_string_lossy().into_owned(),
        "-i".to_string(),
        patch.source.to_string_lossy().into_owned(),
    ]);
    args
}
