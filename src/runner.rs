//! Verification command execution.
//!
//! Spawns the verification command through the platform shell, blocking until
//! it exits and capturing its output. Modeled as a capability seam
//! ([`CommandRunner`]) so the state machine can be driven by fakes in tests.

use std::process::Command;

use crate::error::AbacusError;

/// Exit code the shell reports when a command cannot be found.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn command_not_found(&self) -> bool {
        self.code == EXIT_COMMAND_NOT_FOUND
    }
}

/// Capability seam for running verification commands.
pub trait CommandRunner {
    fn run(&self, cmd: &str) -> Result<CommandOutput, AbacusError>;
}

/// Runs commands through `sh -c` (`cmd /C` on Windows), blocking the caller.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, cmd: &str) -> Result<CommandOutput, AbacusError> {
        let (shell, shell_arg) = shell();
        let output = Command::new(shell).arg(shell_arg).arg(cmd).output()?;

        Ok(CommandOutput {
            // status.code() is None when the process was killed by a signal.
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static str) {
    ("cmd", "/C")
}

#[cfg(not(windows))]
fn shell() -> (&'static str, &'static str) {
    ("sh", "-c")
}
