use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Run a command and capture output
///
/// Fails with the command's stderr (or stdout when stderr is empty) when
/// it exits non-zero.
pub fn run_capture(cmd: &str, args: &[String]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        anyhow::bail!("Command failed: {} {}: {}", cmd, args.join(" "), detail)
    }
}

/// Run a shell command line in `dir`, capturing its output
pub fn run_shell(command_line: &str, dir: &Path) -> Result<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {command_line}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}: {}", command_line, stderr.trim())
    }
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
