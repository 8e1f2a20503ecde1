//! Scoped verbosity control
//!
//! The reset primitive reinstalls packages through the host's installer,
//! which is chatty. Its output is silenced by lowering the global `log`
//! level for the duration of the call.

use log::LevelFilter;

/// Lowers the global log level until dropped
///
/// The previous level is restored on every exit path, including early
/// returns, errors and unwinding. When the level is already `Debug` or more
/// verbose, it is left alone.
#[must_use = "verbosity is restored as soon as the guard is dropped"]
pub struct QuietGuard {
    previous: LevelFilter,
}

impl QuietGuard {
    /// Silence everything below `Error`
    pub fn engage() -> Self {
        let previous = log::max_level();
        if previous < LevelFilter::Debug {
            log::set_max_level(LevelFilter::Error);
        }
        Self { previous }
    }
}

impl Drop for QuietGuard {
    fn drop(&mut self) {
        log::set_max_level(self.previous);
    }
}
