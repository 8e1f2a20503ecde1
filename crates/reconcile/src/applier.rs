//! Reconciliation pass over a whole repository
//!
//! One pass:
//! 1. Analysis - which packages must be reset, what is desired
//! 2. Scoping - narrow both queues by targets and filters
//! 3. Execution - reset stale packages, apply pending patches, package by package
//! 4. Bookkeeping - sanitize leftovers and persist the applied records
//!
//! The records are persisted once at the end of a successful pass, or once
//! before a failure propagates, so they always describe what is on disk.

use crate::analyser::{determine_package_resets, expand_resets};
use crate::context::{PatchApplier, ProgressCallback};
use crate::error::{Error, Result};
use crate::filter::{compose_regex, filter_by_sub_item_keys, filter_keys, MatchMode};
use crate::inspector::{has_patch_changes, reset_applied_patches};
use crate::output::QuietGuard;
use crate::repository::{PackageSource, PatchesRepository, RESET_REASON};
use crate::simplify::{collect_stray_files, create_simplified_list, sanitize_file_system};
use crate::status::PatchStatus;
use crate::tracker::register_applied_patches;
use crate::types::{
    AppliedPatches, InstalledPackages, Package, PatchDefinition, PatchQueue, PatchSet, ResetQueue,
};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Narrow the patch queue to patch paths matching `filters`
///
/// Returns `None` when `filters` compose to no matcher.
pub fn narrow_by_filters<S: AsRef<str>>(
    queue: &PatchQueue,
    filters: &[S],
) -> Result<Option<PatchQueue>> {
    let Some(matcher) = compose_regex(filters, MatchMode::Substring)? else {
        return Ok(None);
    };
    Ok(Some(filter_by_sub_item_keys(queue, &matcher)))
}

/// Narrow both queues to package names matching `targets`
///
/// Returns `None` when `targets` compose to no matcher.
pub fn narrow_by_targets<S: AsRef<str>>(
    queue: &PatchQueue,
    resets: &ResetQueue,
    targets: &[S],
) -> Result<Option<(PatchQueue, ResetQueue)>> {
    let Some(matcher) = compose_regex(targets, MatchMode::Exact)? else {
        return Ok(None);
    };
    let resets = resets
        .iter()
        .filter(|name| matcher.is_match(name))
        .cloned()
        .collect();
    Ok(Some((filter_keys(queue, &matcher), resets)))
}

/// Keep only the patches still present in the narrowed queue
///
/// Owners missing from the queue keep an empty list: none of their
/// patches are considered this run.
pub fn restrict_patches(patches: &PatchSet, queue: &PatchQueue) -> PatchSet {
    patches
        .iter()
        .map(|(owner, list)| {
            let selected = queue.get(owner);
            let kept = list
                .iter()
                .filter(|patch| selected.is_some_and(|paths| paths.contains_key(&patch.path)))
                .cloned()
                .collect();
            (owner.clone(), kept)
        })
        .collect()
}

/// Result of narrowing the desired state by targets and filters
#[derive(Debug, Clone)]
pub struct Scope {
    pub patches: PatchSet,
    pub patch_queue: PatchQueue,
    pub reset_queue: ResetQueue,
    /// Whether targets or filters took effect
    pub scoped: bool,
}

impl Scope {
    /// Run the narrowing pipeline
    ///
    /// A package selected for reset drags along every package whose
    /// recorded patches touch it. Those owners stay in scope with their
    /// whole desired list, since the reset wipes all of their patches.
    ///
    /// # Errors
    /// Returns [`Error::Selector`] when targets or filters do not compile.
    pub fn narrow<S: AsRef<str>>(
        patches: &PatchSet,
        packages: &InstalledPackages,
        reset_queue: ResetQueue,
        targets: &[S],
        filters: &[S],
    ) -> Result<Self> {
        let full_queue = create_simplified_list(patches);
        let mut patch_queue = full_queue.clone();
        let mut reset_queue = reset_queue;
        let mut scoped = false;
        let mut targets: Vec<String> = targets.iter().map(|t| t.as_ref().to_string()).collect();

        if let Some(filtered) = narrow_by_filters(&patch_queue, filters)? {
            scoped = true;
            patch_queue = filtered;
            if targets.is_empty() {
                targets = patch_queue.keys().cloned().collect();
                if targets.is_empty() {
                    // Filters selected nothing, so nothing may be reset either.
                    reset_queue.clear();
                }
            }
        }

        if let Some((queue, resets)) = narrow_by_targets(&patch_queue, &reset_queue, &targets)? {
            scoped = true;
            patch_queue = queue;

            let mut closed = resets.clone();
            expand_resets(packages, &mut closed, Vec::new());
            for owner in closed.difference(&resets) {
                if let Some(keys) = full_queue.get(owner) {
                    log::debug!("{owner} is reset along with a selected package");
                    patch_queue.insert(owner.clone(), keys.clone());
                }
            }
            reset_queue = closed;
        }

        let patches = if scoped {
            restrict_patches(patches, &patch_queue)
        } else {
            patches.clone()
        };

        Ok(Self {
            patches,
            patch_queue,
            reset_queue,
            scoped,
        })
    }
}

/// Reconcile applied patches with the repository's desired patches
///
/// # Arguments
/// * `repository` - Desired patches, installed packages and their store
/// * `applier` - Patch execution engine
/// * `progress` - Progress callback
/// * `targets` - Package name selectors; empty means all packages
/// * `filters` - Patch path selectors; empty means all patches
///
/// # Returns
/// Whether any package was reset or patched
///
/// # Errors
/// Aborts on an invalid selector, the first unknown target, failed reset
/// or failed patch. The applied records are persisted before a reset or
/// patch failure is returned.
pub fn apply<S, A, P>(
    repository: &mut PatchesRepository<S>,
    applier: &mut A,
    progress: &mut P,
    targets: &[String],
    filters: &[String],
) -> Result<bool>
where
    S: PackageSource,
    A: PatchApplier,
    P: ProgressCallback,
{
    log::info!("Processing patches configuration");

    let desired = repository.patches().clone();
    let resets = determine_package_resets(repository.targets(), &desired);
    let Scope {
        patches,
        patch_queue,
        mut reset_queue,
        scoped,
    } = Scope::narrow(&desired, repository.targets(), resets, targets, filters)?;

    verify_targets(&patches, repository.targets())?;
    let shipped = collect_stray_files(&patches, repository.targets(), repository.source());

    let mut changed = false;
    let mut visited = HashSet::new();
    let mut work: VecDeque<String> = repository.targets().names().into();

    while let Some(name) = work.pop_front() {
        visited.insert(name.clone());

        let owned = patches.get(&name).map(Vec::as_slice).unwrap_or(&[]);
        let has_patches = !owned.is_empty();
        let patch_targets = collect_targets(&name, owned);

        for target in patch_targets.iter().filter(|t| reset_queue.contains(*t)) {
            let Some(package) = repository.targets().get(target).cloned() else {
                log::debug!("Skipping reset of {target}: not installed");
                continue;
            };

            let announce = !has_patches && !patch_queue.contains_key(target) && !package.applied.is_empty();
            progress.on_reset(target, announce);
            report_stale(progress, target, &package.applied, &desired);

            let reinstalled = {
                let _quiet = QuietGuard::engage();
                repository.source_mut().reinstall(&package, RESET_REASON)
            };
            if let Err(e) = reinstalled {
                repository.write()?;
                return Err(Error::Reset {
                    package: target.clone(),
                    source: e.into(),
                });
            }

            if let Some(package) = repository.targets_mut().get_mut(target) {
                reset_applied_patches(package);
            }
            changed = true;

            let owns_patches = patches.get(target).is_some_and(|list| !list.is_empty());
            if *target != name && owns_patches && visited.contains(target) && !work.contains(target) {
                log::debug!("Re-queueing {target} after reset");
                work.push_back(target.clone());
            }
        }

        for target in &patch_targets {
            reset_queue.remove(target);
        }

        if !has_patches {
            continue;
        }

        // Any target whose state differs triggers application.
        let has_changes = patch_targets.iter().any(|target| {
            let Some(package) = repository.targets().get(target) else {
                return false;
            };
            let empty = BTreeMap::new();
            let wanted = patch_queue.get(target).unwrap_or(&empty);
            if scoped {
                let selected = package.applied.restricted_to(wanted.keys());
                has_patch_changes(&Package::new(target.as_str()).with_applied(selected), wanted)
            } else {
                has_patch_changes(package, wanted)
            }
        });

        if !has_changes {
            continue;
        }

        let Some(package) = repository.targets().get(&name).cloned() else {
            continue;
        };
        let pending: Vec<PatchDefinition> = owned
            .iter()
            .filter(|patch| !is_recorded(repository.targets(), patch))
            .cloned()
            .collect();
        if pending.is_empty() {
            continue;
        }

        report_queued(progress, &name, owned, &desired, &pending);
        progress.on_apply_start(&name, pending.len());
        changed = true;

        let install_path = repository.source().install_path(&package);
        let outcome = applier.apply_patches(&package, &install_path, &pending);
        progress.on_apply_complete(&name, outcome.is_ok());

        let landed: &[PatchDefinition] = match &outcome {
            Ok(()) => &pending,
            Err(failure) => {
                let position = pending
                    .iter()
                    .position(|patch| patch.path == failure.path)
                    .unwrap_or(0);
                &pending[..position]
            }
        };
        for patch in landed {
            progress.on_patch_status(&name, &patch.path, PatchStatus::Applied);
        }

        let record = recorded_after(repository.targets(), &name, &desired, landed);
        register_applied_patches(
            repository.targets_mut(),
            &BTreeMap::from([(name.clone(), record)]),
        );

        if let Err(failure) = outcome {
            let cleaned = sanitize_file_system(
                &patches,
                repository.targets(),
                repository.source(),
                &shipped,
            );
            if let Err(e) = cleaned {
                log::warn!("Could not clean up after failed patch: {e}");
            }
            repository.write()?;
            return Err(Error::PatchFailed {
                package: name,
                path: failure.path,
                source: failure.error.into(),
            });
        }
    }

    let sanitized = sanitize_file_system(&patches, repository.targets(), repository.source(), &shipped);
    repository.write()?;
    sanitized?;

    progress.on_finish(changed);
    Ok(changed)
}

/// Revert patched packages to their pristine state and clear their records
///
/// `targets` selects packages by name; empty means every patched package.
/// Packages whose recorded patches touch a selected package are reverted
/// too, since the reset wipes their changes as well.
///
/// # Returns
/// Whether any package was reverted
///
/// # Errors
/// Fails on an invalid selector before anything is touched. Aborts on the
/// first failed reset after persisting the records of the packages
/// reverted so far.
pub fn revert<S, P>(
    repository: &mut PatchesRepository<S>,
    progress: &mut P,
    targets: &[String],
) -> Result<bool>
where
    S: PackageSource,
    P: ProgressCallback,
{
    let matcher = compose_regex(targets, MatchMode::Exact)?;
    let packages = repository.targets();

    let touched: BTreeSet<String> = packages
        .iter()
        .flat_map(|package| package.applied.targets())
        .collect();
    let mut queue: ResetQueue = packages
        .iter()
        .filter(|package| !package.applied.is_empty() || touched.contains(&package.name))
        .filter(|package| matcher.as_ref().is_none_or(|m| m.is_match(&package.name)))
        .map(|package| package.name.clone())
        .collect();
    expand_resets(packages, &mut queue, Vec::new());

    let mut changed = false;
    for name in packages.names() {
        if !queue.contains(&name) {
            continue;
        }
        let Some(package) = repository.targets().get(&name).cloned() else {
            continue;
        };

        progress.on_reset(&name, true);
        for entry in package.applied.iter() {
            progress.on_patch_status(&name, &entry.path, PatchStatus::Removed);
        }

        let reinstalled = {
            let _quiet = QuietGuard::engage();
            repository.source_mut().reinstall(&package, RESET_REASON)
        };
        if let Err(e) = reinstalled {
            repository.write()?;
            return Err(Error::Reset {
                package: name,
                source: e.into(),
            });
        }

        if let Some(package) = repository.targets_mut().get_mut(&name) {
            reset_applied_patches(package);
        }
        changed = true;
    }

    repository.write()?;

    progress.on_finish(changed);
    Ok(changed)
}

/// Fail on the first target that is not installed
fn verify_targets(patches: &PatchSet, packages: &InstalledPackages) -> Result<()> {
    for patch in patches.values().flatten() {
        for target in &patch.targets {
            if packages.contains(target) {
                continue;
            }
            let referencing = patches
                .values()
                .flatten()
                .filter(|p| p.targets.contains(target))
                .map(|p| p.path.clone())
                .collect();
            return Err(Error::UnknownTarget {
                target: target.clone(),
                patches: referencing,
            });
        }
    }
    Ok(())
}

/// Union of declared targets in first-seen order, or the package itself
fn collect_targets(name: &str, owned: &[PatchDefinition]) -> Vec<String> {
    if owned.is_empty() {
        return vec![name.to_string()];
    }
    let mut seen = BTreeSet::new();
    owned
        .iter()
        .flat_map(|patch| patch.targets.iter())
        .filter(|target| seen.insert(target.as_str()))
        .cloned()
        .collect()
}

fn is_recorded(packages: &InstalledPackages, patch: &PatchDefinition) -> bool {
    packages
        .get(&patch.owner)
        .and_then(|package| package.applied.get(&patch.path))
        .is_some_and(|entry| entry.hash == patch.hash)
}

/// Declared patches that are on disk once `landed` has been applied
///
/// Keeps matching entries of patches that were excluded this run.
fn recorded_after(
    packages: &InstalledPackages,
    owner: &str,
    desired: &PatchSet,
    landed: &[PatchDefinition],
) -> Vec<PatchDefinition> {
    desired
        .get(owner)
        .map(Vec::as_slice)
        .unwrap_or(&[])
        .iter()
        .filter(|patch| {
            is_recorded(packages, patch) || landed.iter().any(|done| done.path == patch.path)
        })
        .cloned()
        .collect()
}

fn report_stale<P: ProgressCallback>(
    progress: &mut P,
    package: &str,
    applied: &AppliedPatches,
    desired: &PatchSet,
) {
    let wanted = desired.get(package).filter(|list| !list.is_empty());
    for entry in applied.iter() {
        let status = match wanted.map(|list| list.iter().find(|p| p.path == entry.path)) {
            None => PatchStatus::Unknown,
            Some(None) => PatchStatus::Removed,
            Some(Some(patch)) if patch.hash != entry.hash => PatchStatus::Changed,
            Some(Some(_)) => continue,
        };
        progress.on_patch_status(package, &entry.path, status);
    }
}

fn report_queued<P: ProgressCallback>(
    progress: &mut P,
    owner: &str,
    selected: &[PatchDefinition],
    desired: &PatchSet,
    pending: &[PatchDefinition],
) {
    for patch in desired.get(owner).map(Vec::as_slice).unwrap_or(&[]) {
        let status = if !selected.iter().any(|p| p.path == patch.path) {
            PatchStatus::Excluded
        } else if pending.iter().any(|p| p.path == patch.path) {
            PatchStatus::New
        } else {
            PatchStatus::Match
        };
        progress.on_patch_status(owner, &patch.path, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> PatchSet {
        let mut set = PatchSet::new();
        set.insert(
            "pkg/a".into(),
            vec![
                PatchDefinition::new("pkg/a", "patches/p1.patch", "h1"),
                PatchDefinition::new("pkg/a", "patches/p2.patch", "h2"),
            ],
        );
        set.insert(
            "pkg/b".into(),
            vec![PatchDefinition::new("pkg/b", "patches/p3.patch", "h3")],
        );
        set
    }

    fn resets(names: &[&str]) -> ResetQueue {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn installed() -> InstalledPackages {
        ["pkg/a", "pkg/b"].into_iter().map(Package::new).collect()
    }

    #[test]
    fn test_unscoped_keeps_everything() {
        let none: [&str; 0] = [];
        let scope = Scope::narrow(&desired(), &installed(), resets(&["pkg/b"]), &none, &none).unwrap();
        assert!(!scope.scoped);
        assert_eq!(scope.patches, desired());
        assert_eq!(scope.reset_queue, resets(&["pkg/b"]));
    }

    #[test]
    fn test_filter_selects_patches_and_defaults_targets() {
        let scope = Scope::narrow(&desired(), &installed(), resets(&["pkg/a", "pkg/b"]), &[], &["p1"]).unwrap();

        assert!(scope.scoped);
        assert_eq!(scope.patch_queue.keys().collect::<Vec<_>>(), vec!["pkg/a"]);
        assert_eq!(scope.reset_queue, resets(&["pkg/a"]));
        let paths: Vec<&str> = scope.patches["pkg/a"].iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["patches/p1.patch"]);
        assert!(scope.patches["pkg/b"].is_empty());
    }

    #[test]
    fn test_filter_matching_nothing_resets_nothing() {
        let scope = Scope::narrow(&desired(), &installed(), resets(&["pkg/a"]), &[], &["nope"]).unwrap();
        assert!(scope.patch_queue.is_empty());
        assert!(scope.reset_queue.is_empty());
        assert!(scope.patches.values().all(Vec::is_empty));
    }

    #[test]
    fn test_explicit_targets_narrow_both_queues() {
        let scope = Scope::narrow(&desired(), &installed(), resets(&["pkg/a", "pkg/b"]), &["pkg/b"], &[]).unwrap();
        assert_eq!(scope.reset_queue, resets(&["pkg/b"]));
        assert!(scope.patches["pkg/a"].is_empty());
        assert_eq!(scope.patches["pkg/b"].len(), 1);
    }

    #[test]
    fn test_filters_and_targets_combine() {
        let scope = Scope::narrow(&desired(), &installed(), resets(&[]), &["pkg/b"], &["p1"]).unwrap();
        assert!(scope.patch_queue.is_empty());
        assert!(scope.patches.values().all(Vec::is_empty));
    }

    #[test]
    fn test_target_reset_drags_in_owners_touching_it() {
        let mut patches = desired();
        patches.insert(
            "pkg/a".into(),
            vec![PatchDefinition::new("pkg/a", "bundle", "h").with_targets(["pkg/b"])],
        );
        let mut packages = installed();
        packages.insert(Package::new("pkg/a").with_applied(AppliedPatches(vec![
            crate::types::AppliedPatch::from(&patches["pkg/a"][0]),
        ])));

        let scope = Scope::narrow(&patches, &packages, resets(&["pkg/b"]), &["pkg/b"], &[]).unwrap();

        assert_eq!(scope.reset_queue, resets(&["pkg/a", "pkg/b"]));
        assert_eq!(scope.patches["pkg/a"].len(), 1);
        assert_eq!(scope.patches["pkg/b"].len(), 1);
    }

    #[test]
    fn test_unusable_target_selector_is_an_error() {
        let huge: Vec<String> = (0..20_000).map(|i| format!("x{i}*")).collect();
        let none: [String; 0] = [];
        let err = Scope::narrow(&desired(), &installed(), resets(&["pkg/a"]), huge.as_slice(), &none).unwrap_err();
        assert!(matches!(err, Error::Selector { .. }));
    }

    #[test]
    fn test_collect_targets() {
        let owned = vec![
            PatchDefinition::new("pkg/a", "p1", "h").with_targets(["pkg/c"]),
            PatchDefinition::new("pkg/a", "p2", "h").with_targets(["pkg/b", "pkg/c"]),
        ];
        assert_eq!(collect_targets("pkg/a", &owned), vec!["pkg/a", "pkg/c", "pkg/b"]);
        assert_eq!(collect_targets("pkg/z", &[]), vec!["pkg/z"]);
    }

    #[test]
    fn test_verify_targets_names_unresolved_target() {
        let mut patches = desired();
        patches.get_mut("pkg/b").unwrap()[0] =
            PatchDefinition::new("pkg/b", "patches/p3.patch", "h3").with_targets(["pkg/ghost"]);
        let packages: InstalledPackages = ["pkg/a", "pkg/b"]
            .into_iter()
            .map(Package::new)
            .collect();

        let err = verify_targets(&patches, &packages).unwrap_err();
        match err {
            Error::UnknownTarget { target, patches } => {
                assert_eq!(target, "pkg/ghost");
                assert_eq!(patches, vec!["patches/p3.patch"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
