use colored::{ColoredString, Colorize};
use reconcile::{PatchStatus, ProgressCallback};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Status label in its display color
pub fn status_label(status: PatchStatus) -> ColoredString {
    let label = status.label();
    match status {
        PatchStatus::New | PatchStatus::Match => label.green(),
        PatchStatus::Changed => label.yellow(),
        PatchStatus::Applied => label.white().bold(),
        PatchStatus::Removed | PatchStatus::Unknown => label.red(),
        PatchStatus::Excluded => label.dimmed(),
    }
}

// ============================================================================
// Console Progress
// ============================================================================

/// Renders reconciliation progress on the terminal
pub struct ConsoleProgress {
    quiet: bool,
    current: Option<String>,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            current: None,
        }
    }

    fn package_header(&mut self, package: &str) {
        if self.current.as_deref() != Some(package) {
            header(package);
            self.current = Some(package.to_string());
        }
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_reset(&mut self, package: &str, announce: bool) {
        if self.quiet {
            return;
        }
        if announce {
            info(&format!("Resetting patched package {}", package.bold()));
        } else {
            log::info!("Resetting {package}");
        }
    }

    fn on_apply_start(&mut self, package: &str, count: usize) {
        if self.quiet {
            return;
        }
        self.package_header(package);
        dim(&format!(
            "{count} patch{} to apply",
            if count == 1 { "" } else { "es" }
        ));
    }

    fn on_patch_status(&mut self, package: &str, path: &str, status: PatchStatus) {
        if self.quiet {
            return;
        }
        self.package_header(package);
        println!("  {path} [{}]", status_label(status));
    }

    fn on_apply_complete(&mut self, package: &str, success: bool) {
        if !success {
            error(&format!("Patching {package} stopped at a failed patch"));
        }
    }

    fn on_finish(&mut self, changed: bool) {
        if self.quiet {
            return;
        }
        println!();
        if changed {
            success("Writing patch info to install file");
        } else {
            info("Nothing to patch");
        }
    }
}
