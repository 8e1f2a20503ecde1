//! Patch status vocabulary
//!
//! Every component classifies a patch's relationship between the desired
//! configuration and the applied record using this closed set.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reconciliation outcome for a single patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchStatus {
    /// Desired, never applied
    New,
    /// Applied record equals the desired entry
    Match,
    /// Applied record differs from the desired entry
    Changed,
    /// Applied during this run
    Applied,
    /// Applied previously, no longer desired
    Removed,
    /// Left out by target/filter selectors this run
    Excluded,
    /// Applied record without a resolvable definition
    Unknown,
}

impl PatchStatus {
    pub const ALL: [Self; 7] = [
        Self::New,
        Self::Match,
        Self::Changed,
        Self::Applied,
        Self::Removed,
        Self::Excluded,
        Self::Unknown,
    ];

    /// Upper-case label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Match => "MATCH",
            Self::Changed => "CHANGED",
            Self::Applied => "APPLIED",
            Self::Removed => "REMOVED",
            Self::Excluded => "EXCLUDED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown patch status: {s}"))
    }
}
