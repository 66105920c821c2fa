//! Process boundary to the host: package manager, service manager, nginx,
//! resolution utilities.
//!
//! Everything that shells out goes through [`CommandRunner`] so the
//! reconciliation logic can be exercised against [`FakeRunner`] instead of
//! mutating the real system. Calls block until the child exits; there is no
//! timeout layer.

mod fake;

pub use fake::FakeRunner;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// stdout followed by stderr, as a terminal would show them.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Capability to execute external programs.
///
/// `run` only fails when the program could not be spawned at all; a
/// non-zero exit is reported through [`CommandOutput::success`].
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Resolve `program` on the executable search path.
    fn find(&self, program: &str) -> Option<PathBuf>;
}

/// Run a command and turn a non-zero exit into an error carrying its output.
pub fn run_checked(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> Result<CommandOutput> {
    let output = runner.run(program, args)?;
    if !output.success {
        let detail = output.combined();
        bail!(
            "`{} {}` failed ({}): {}",
            program,
            args.join(" "),
            output
                .code
                .map(|c| format!("exit {c}"))
                .unwrap_or_else(|| "killed".to_string()),
            detail.trim()
        );
    }
    Ok(output)
}

/// Runs real processes on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(program, ?args, "running");
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("executing `{} {}`", program, args.join(" ")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn find(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}
