//! `apply`, `undo` and `redo`

use anyhow::{Context as _, Result};
use reconcile::PatchesRepository;

use crate::Context;
use crate::cli::{SelectArgs, TargetArgs};
use crate::config::Project;
use crate::executor::CommandApplier;
use crate::runner;
use crate::store::DirectoryStore;
use crate::ui::{self, ConsoleProgress};

pub fn apply(ctx: &Context, args: &SelectArgs) -> Result<()> {
    let (project, mut repository) = super::open(ctx)?;
    run_apply(ctx, &project, &mut repository, args)
}

pub fn undo(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let (_, mut repository) = super::open(ctx)?;
    run_undo(ctx, &mut repository, &args.targets)
}

pub fn redo(ctx: &Context, args: &SelectArgs) -> Result<()> {
    let (project, mut repository) = super::open(ctx)?;

    let targets = if args.target.targets.is_empty() && !args.filters.is_empty() {
        let queue = reconcile::create_simplified_list(repository.patches());
        let owners: Vec<String> = reconcile::narrow_by_filters(&queue, &args.filters)?
            .map(|selected| selected.keys().cloned().collect())
            .unwrap_or_default();
        if owners.is_empty() {
            ui::info("No patches match the given filters");
            return Ok(());
        }
        owners
    } else {
        args.target.targets.clone()
    };

    run_undo(ctx, &mut repository, &targets)?;
    run_apply(ctx, &project, &mut repository, args)
}

fn run_apply(
    ctx: &Context,
    project: &Project,
    repository: &mut PatchesRepository<DirectoryStore>,
    args: &SelectArgs,
) -> Result<()> {
    let patch_command = &project.config.patch_command;
    if !repository.patches().is_empty() && !runner::command_exists(patch_command) {
        anyhow::bail!("'{patch_command}' not found in PATH");
    }

    let snapshots = repository
        .source()
        .ensure_snapshots(repository.targets(), repository.patches())?;
    if snapshots > 0 {
        log::info!("Saved {snapshots} pristine snapshots");
    }

    let mut applier = CommandApplier::new(patch_command.as_str(), project.vendor_dir());
    let mut progress = ConsoleProgress::new(ctx.quiet);

    let result = reconcile::apply(
        repository,
        &mut applier,
        &mut progress,
        &args.target.targets,
        &args.filters,
    );

    match result {
        Ok(changed) => {
            if changed && !ctx.quiet {
                ui::success(&format!("{} patches applied", applier.applied()));
            }
            Ok(())
        }
        Err(e) => {
            if let Some(path) = e.failed_patch_path() {
                ui::error(&format!("{path} could not be applied; earlier patches were kept"));
            }
            Err(e).context("Patching failed")
        }
    }
}

fn run_undo(
    ctx: &Context,
    repository: &mut PatchesRepository<DirectoryStore>,
    targets: &[String],
) -> Result<()> {
    let mut progress = ConsoleProgress::new(ctx.quiet);
    let changed =
        reconcile::revert(repository, &mut progress, targets).context("Reverting patches failed")?;
    if changed && !ctx.quiet {
        ui::success("Patched packages restored");
    }
    Ok(())
}
