//! Core types for patch reconciliation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

/// A single patch as declared in the desired configuration
///
/// Identity is `path`, unique within the owner's patch list. A patch may
/// modify files of packages other than its owner; those are listed in
/// `targets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDefinition {
    /// Locator of the patch within its owner's group
    pub path: String,
    /// Package the patch is declared under
    pub owner: String,
    /// Packages whose source trees the patch modifies
    pub targets: Vec<String>,
    /// File the diff body is read from
    pub source: PathBuf,
    /// Optional human-readable description
    #[serde(default)]
    pub label: Option<String>,
    /// Comparison key, derived from the diff content
    pub hash: String,
    /// Leading path components to strip when applying
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    1
}

impl PatchDefinition {
    /// Create a definition targeting only its owner
    pub fn new(owner: impl Into<String>, path: impl Into<String>, hash: impl Into<String>) -> Self {
        let owner = owner.into();
        let path = path.into();
        Self {
            source: PathBuf::from(&path),
            targets: vec![owner.clone()],
            path,
            owner,
            label: None,
            hash: hash.into(),
            level: default_level(),
        }
    }

    /// Replace the target list, keeping the owner first
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all = vec![self.owner.clone()];
        for target in targets {
            let target = target.into();
            if !all.contains(&target) {
                all.push(target);
            }
        }
        self.targets = all;
        self
    }

    /// Display name: the label when present, else the path
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.path)
    }
}

/// Desired patches: owner package name → patches in declaration order
pub type PatchSet = BTreeMap<String, Vec<PatchDefinition>>;

/// Simplified desired patches: owner → patch path → comparison key
pub type PatchQueue = BTreeMap<String, BTreeMap<String, String>>;

/// Packages to revert during a run
pub type ResetQueue = BTreeSet<String>;

/// One entry of a package's applied record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPatch {
    pub path: String,
    pub hash: String,
    /// Packages the patch modified when it was applied
    #[serde(default)]
    pub targets: Vec<String>,
}

impl From<&PatchDefinition> for AppliedPatch {
    fn from(patch: &PatchDefinition) -> Self {
        Self {
            path: patch.path.clone(),
            hash: patch.hash.clone(),
            targets: patch.targets.clone(),
        }
    }
}

/// Patches applied to a package in previous runs, in application order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppliedPatches(pub Vec<AppliedPatch>);

impl AppliedPatches {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppliedPatch> {
        self.0.iter()
    }

    /// Find an entry by patch path
    pub fn get(&self, path: &str) -> Option<&AppliedPatch> {
        self.0.iter().find(|entry| entry.path == path)
    }

    /// Recorded paths in application order
    pub fn paths(&self) -> Vec<&str> {
        self.0.iter().map(|entry| entry.path.as_str()).collect()
    }

    /// Path → comparison key view
    pub fn keys(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|entry| (entry.path.clone(), entry.hash.clone()))
            .collect()
    }

    /// Every package touched by a recorded patch
    pub fn targets(&self) -> BTreeSet<String> {
        self.0
            .iter()
            .flat_map(|entry| entry.targets.iter().cloned())
            .collect()
    }

    /// Entries whose path is in `paths`, order preserved
    pub fn restricted_to<'a, I>(&self, paths: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let keep: BTreeSet<&String> = paths.into_iter().collect();
        Self(
            self.0
                .iter()
                .filter(|entry| keep.contains(&entry.path))
                .cloned()
                .collect(),
        )
    }
}

/// An installed package and its applied record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub applied: AppliedPatches,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied: AppliedPatches::default(),
        }
    }

    pub fn with_applied(mut self, applied: AppliedPatches) -> Self {
        self.applied = applied;
        self
    }
}

/// Installed packages in store order, addressed by name
#[derive(Debug, Clone, Default)]
pub struct InstalledPackages {
    packages: Vec<Package>,
    index: HashMap<String, usize>,
}

impl InstalledPackages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package, replacing any package with the same name in place
    pub fn insert(&mut self, package: Package) {
        if let Some(&idx) = self.index.get(&package.name) {
            self.packages[idx] = package;
        } else {
            self.index.insert(package.name.clone(), self.packages.len());
            self.packages.push(package);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.index.get(name).map(|&idx| &self.packages[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.index.get(name).map(|&idx| &mut self.packages[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Package names in store order
    pub fn names(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl FromIterator<Package> for InstalledPackages {
    fn from_iter<T: IntoIterator<Item = Package>>(iter: T) -> Self {
        let mut packages = Self::new();
        for package in iter {
            packages.insert(package);
        }
        packages
    }
}
