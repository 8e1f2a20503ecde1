//! Error types for patch reconciliation

use std::path::PathBuf;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that abort a reconciliation pass
#[derive(Error, Debug)]
pub enum Error {
    /// A patch declares a target that is not installed
    #[error("unknown target \"{target}\" encountered when checking patch changes for: {}", .patches.join(","))]
    UnknownTarget { target: String, patches: Vec<String> },

    /// Target or filter selectors do not compile into a matcher
    #[error("invalid selectors")]
    Selector {
        selectors: String,
        #[source]
        source: regex::Error,
    },

    /// The patch engine could not apply a patch
    #[error("failed to apply patch {path} to {package}")]
    PatchFailed {
        package: String,
        path: String,
        #[source]
        source: BoxError,
    },

    /// Reinstalling a pristine copy failed
    #[error("failed to reset package {package}")]
    Reset {
        package: String,
        #[source]
        source: BoxError,
    },

    /// Persisting the applied records failed
    #[error("failed to persist applied patches")]
    Persist {
        #[source]
        source: BoxError,
    },

    /// Removing a stray artifact failed
    #[error("failed to remove {}: {source}", .path.display())]
    Sanitize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Path of the failed patch, when a patch failed to apply
    pub fn failed_patch_path(&self) -> Option<&str> {
        match self {
            Self::PatchFailed { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
