//! # Reconcile
//!
//! Keeps the patches applied to installed packages in line with the
//! patches that should be applied.
//!
//! Given the desired patches per package, the record of what previous runs
//! applied, and the installed packages, a reconciliation pass resets
//! packages whose applied patches went stale, applies whatever is pending in
//! declaration order, and persists a record that always matches the disk,
//! even when a patch fails halfway through a package's list.
//!
//! ## Core Concepts
//!
//! - **PatchDefinition**: one patch, declared under an owner, modifying one or more target packages
//! - **AppliedPatches**: the per-package record of patches already on disk
//! - **PatchStatus**: NEW, MATCH, CHANGED, APPLIED, REMOVED, EXCLUDED, UNKNOWN
//! - **PatchesRepository**: desired patches + installed packages + their store
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{apply, revert, NoProgress, PatchesRepository};
//!
//! let mut repository = PatchesRepository::new(patches, packages, store);
//! let changed = apply(&mut repository, &mut engine, &mut NoProgress, &[], &[])?;
//!
//! // Back to pristine for one package (and anything whose patches touch it)
//! revert(&mut repository, &mut NoProgress, &["acme/http".to_string()])?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`PackageSource`]: locates, reinstalls and persists installed packages
//! - [`PatchApplier`]: applies an ordered list of patches to one package
//! - [`ProgressCallback`]: receives status updates

pub mod analyser;
pub mod applier;
pub mod context;
pub mod error;
pub mod filter;
pub mod inspector;
pub mod output;
pub mod repository;
pub mod simplify;
pub mod status;
pub mod tracker;
pub mod types;

// Re-export main types at crate root
pub use analyser::{determine_package_resets, patch_statuses, PatchReport};
pub use applier::{
    apply, narrow_by_filters, narrow_by_targets, restrict_patches, revert, Scope,
};
pub use context::{NoProgress, PatchApplier, PatchFailure, ProgressCallback};
pub use error::{Error, Result};
pub use filter::{compose_regex, filter_by_sub_item_keys, filter_keys, MatchMode, Matcher};
pub use inspector::{has_patch_changes, reset_applied_patches};
pub use output::QuietGuard;
pub use repository::{PackageSource, PatchesRepository, RESET_REASON};
pub use simplify::{collect_stray_files, create_simplified_list, sanitize_file_system};
pub use status::PatchStatus;
pub use tracker::register_applied_patches;
pub use types::{
    AppliedPatch, AppliedPatches, InstalledPackages, Package, PatchDefinition, PatchQueue,
    PatchSet, ResetQueue,
};
