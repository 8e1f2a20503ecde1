//! Desired vs. applied analysis
//!
//! Decides which packages must go back to their pristine state before
//! anything is applied, and classifies every patch for reporting.

use crate::status::PatchStatus;
use crate::types::{AppliedPatches, InstalledPackages, PatchDefinition, PatchSet, ResetQueue};
use serde::Serialize;

/// Packages that must be reverted this run
///
/// A package with an applied record is stale when a recorded patch was
/// removed or changed, when it no longer has any desired patches, or when
/// its record is not an ordered prefix of the desired list. Every target of
/// a stale package's recorded patches is reset, and so is any package whose
/// own recorded patches touch a package being reset.
pub fn determine_package_resets(packages: &InstalledPackages, desired: &PatchSet) -> ResetQueue {
    let mut queue = ResetQueue::new();
    let mut stale_owners = Vec::new();

    for package in packages.iter().filter(|p| !p.applied.is_empty()) {
        let wanted = desired.get(&package.name).map(Vec::as_slice).unwrap_or(&[]);
        if is_stale(&package.applied, wanted) {
            log::debug!("{} has stale patches", package.name);
            stale_owners.push(package.name.clone());
            queue.insert(package.name.clone());
            queue.extend(package.applied.targets());
        }
    }

    expand_resets(packages, &mut queue, stale_owners);
    queue
}

/// Add every package whose recorded patches touch a package in `queue`
///
/// A reset wipes every patch touching the package, whoever owns it.
/// `owners` lists packages whose records are already accounted for.
pub(crate) fn expand_resets(
    packages: &InstalledPackages,
    queue: &mut ResetQueue,
    mut owners: Vec<String>,
) {
    loop {
        let mut grew = false;
        for package in packages.iter().filter(|p| !p.applied.is_empty()) {
            if owners.contains(&package.name) {
                continue;
            }
            let targets = package.applied.targets();
            if queue.contains(&package.name) || targets.iter().any(|t| queue.contains(t)) {
                log::debug!("{} touches a package being reset", package.name);
                owners.push(package.name.clone());
                queue.insert(package.name.clone());
                queue.extend(targets);
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
}

fn is_stale(applied: &AppliedPatches, wanted: &[PatchDefinition]) -> bool {
    if wanted.is_empty() {
        return true;
    }

    let removed_or_changed = applied.iter().any(|entry| {
        wanted
            .iter()
            .find(|patch| patch.path == entry.path)
            .is_none_or(|patch| patch.hash != entry.hash)
    });
    if removed_or_changed {
        return true;
    }

    // Applied patches must be the leading run of the declared order.
    applied.len() > wanted.len()
        || applied
            .iter()
            .zip(wanted)
            .any(|(entry, patch)| entry.path != patch.path)
}

/// Status of a single patch, as shown by listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub owner: String,
    pub path: String,
    pub label: Option<String>,
    pub status: PatchStatus,
}

/// Classify every desired and recorded patch
///
/// Desired patches come first in declaration order, followed by recorded
/// patches that are no longer desired.
pub fn patch_statuses(packages: &InstalledPackages, desired: &PatchSet) -> Vec<PatchReport> {
    let mut reports = Vec::new();

    for (owner, patches) in desired {
        let applied = packages.get(owner).map(|p| &p.applied);
        for patch in patches {
            let status = match applied.and_then(|record| record.get(&patch.path)) {
                None => PatchStatus::New,
                Some(entry) if entry.hash == patch.hash => PatchStatus::Match,
                Some(_) => PatchStatus::Changed,
            };
            reports.push(PatchReport {
                owner: owner.clone(),
                path: patch.path.clone(),
                label: patch.label.clone(),
                status,
            });
        }
    }

    for package in packages.iter() {
        let wanted = desired.get(&package.name).filter(|list| !list.is_empty());
        for entry in package.applied.iter() {
            let status = match wanted {
                None => PatchStatus::Unknown,
                Some(list) if list.iter().any(|p| p.path == entry.path) => continue,
                Some(_) => PatchStatus::Removed,
            };
            reports.push(PatchReport {
                owner: package.name.clone(),
                path: entry.path.clone(),
                label: None,
                status,
            });
        }
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AppliedPatch, Package};

    fn record(owner: &str, entries: &[(&str, &str)], targets: &[&str]) -> Package {
        let mut all_targets = vec![owner.to_string()];
        all_targets.extend(targets.iter().map(|t| (*t).to_string()));
        Package::new(owner).with_applied(AppliedPatches(
            entries
                .iter()
                .map(|(path, hash)| AppliedPatch {
                    path: (*path).into(),
                    hash: (*hash).into(),
                    targets: all_targets.clone(),
                })
                .collect(),
        ))
    }

    fn desired(owner: &str, entries: &[(&str, &str)]) -> PatchSet {
        let mut set = PatchSet::new();
        set.insert(
            owner.into(),
            entries
                .iter()
                .map(|(path, hash)| PatchDefinition::new(owner, *path, *hash))
                .collect(),
        );
        set
    }

    #[test]
    fn test_matching_record_is_not_reset() {
        let packages: InstalledPackages =
            [record("pkg/a", &[("p1", "h1")], &[])].into_iter().collect();
        let queue = determine_package_resets(&packages, &desired("pkg/a", &[("p1", "h1")]));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_appended_patch_is_not_reset() {
        let packages: InstalledPackages =
            [record("pkg/a", &[("p1", "h1")], &[])].into_iter().collect();
        let wanted = desired("pkg/a", &[("p1", "h1"), ("p2", "h2")]);
        assert!(determine_package_resets(&packages, &wanted).is_empty());
    }

    #[test]
    fn test_changed_removed_and_dropped_packages_are_reset() {
        let packages: InstalledPackages = [
            record("pkg/a", &[("p1", "h1")], &[]),
            record("pkg/b", &[("p2", "h2")], &[]),
            record("pkg/c", &[("p3", "h3")], &[]),
            Package::new("pkg/d"),
        ]
        .into_iter()
        .collect();

        let mut wanted = desired("pkg/a", &[("p1", "changed")]);
        wanted.extend(desired("pkg/b", &[("other", "h")]));

        let queue = determine_package_resets(&packages, &wanted);
        assert_eq!(
            queue.into_iter().collect::<Vec<_>>(),
            vec!["pkg/a", "pkg/b", "pkg/c"]
        );
    }

    #[test]
    fn test_insertion_before_applied_patch_is_reset() {
        let packages: InstalledPackages =
            [record("pkg/a", &[("p2", "h2")], &[])].into_iter().collect();
        let wanted = desired("pkg/a", &[("p1", "h1"), ("p2", "h2")]);
        assert!(determine_package_resets(&packages, &wanted).contains("pkg/a"));
    }

    #[test]
    fn test_targets_of_stale_patches_are_reset() {
        let packages: InstalledPackages = [
            record("pkg/a", &[("p1", "h1")], &["pkg/b"]),
            Package::new("pkg/b"),
        ]
        .into_iter()
        .collect();
        let queue = determine_package_resets(&packages, &PatchSet::new());
        assert!(queue.contains("pkg/a"));
        assert!(queue.contains("pkg/b"));
    }

    #[test]
    fn test_packages_touching_a_reset_package_are_reset_too() {
        // pkg/c's patch also modifies pkg/b; resetting pkg/b undoes it.
        let packages: InstalledPackages = [
            record("pkg/a", &[("p1", "h1")], &["pkg/b"]),
            Package::new("pkg/b"),
            record("pkg/c", &[("p3", "h3")], &["pkg/b"]),
        ]
        .into_iter()
        .collect();
        let wanted = desired("pkg/c", &[("p3", "h3")]);

        let queue = determine_package_resets(&packages, &wanted);
        assert_eq!(
            queue.into_iter().collect::<Vec<_>>(),
            vec!["pkg/a", "pkg/b", "pkg/c"]
        );
    }

    #[test]
    fn test_patch_statuses() {
        let packages: InstalledPackages = [
            record("pkg/a", &[("p1", "h1"), ("p2", "h2"), ("gone", "h")], &[]),
            record("pkg/z", &[("orphan", "h")], &[]),
        ]
        .into_iter()
        .collect();
        let wanted = desired("pkg/a", &[("p1", "h1"), ("p2", "new-hash"), ("p3", "h3")]);

        let statuses: Vec<(String, PatchStatus)> = patch_statuses(&packages, &wanted)
            .into_iter()
            .map(|r| (r.path, r.status))
            .collect();

        assert_eq!(
            statuses,
            vec![
                ("p1".to_string(), PatchStatus::Match),
                ("p2".to_string(), PatchStatus::Changed),
                ("p3".to_string(), PatchStatus::New),
                ("gone".to_string(), PatchStatus::Removed),
                ("orphan".to_string(), PatchStatus::Unknown),
            ]
        );
    }
}
