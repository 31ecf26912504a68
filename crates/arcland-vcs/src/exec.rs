//! Process execution seam.
//!
//! Every backend shells out through a [`Runner`] so tests can script VCS
//! responses without a real binary on `PATH`.

use std::path::Path;
use std::process::Command;

use crate::error::VcsError;

/// Captured result of one command invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`None` when killed by a signal).
    pub code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr.
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Runs a program with arguments in a working directory.
pub trait Runner: Send + Sync {
    /// Run `program args...` in `cwd` and capture its output.
    ///
    /// A non-zero exit is not an error at this layer.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::Spawn`] if the program cannot be started.
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput, VcsError>;
}

/// [`Runner`] backed by [`std::process::Command`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput, VcsError> {
        tracing::debug!(program, ?args, cwd = %cwd.display(), "exec");
        let out = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|source| VcsError::Spawn {
                program: program.to_owned(),
                source,
            })?;
        Ok(CommandOutput {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Render a command line for error messages.
pub(crate) fn display_command(program: &str, args: &[&str]) -> String {
    let mut line = program.to_owned();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('\'');
            line.push_str(arg);
            line.push('\'');
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Turn a non-zero exit into [`VcsError::CommandFailed`].
pub(crate) fn check(
    program: &str,
    args: &[&str],
    out: CommandOutput,
) -> Result<CommandOutput, VcsError> {
    if out.success() {
        Ok(out)
    } else {
        Err(VcsError::CommandFailed {
            command: display_command(program, args),
            code: out.code,
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_command_quotes_whitespace() {
        assert_eq!(
            display_command("git", &["merge", "-m", "Automatic merge", "master"]),
            "git merge -m 'Automatic merge' master"
        );
    }

    #[test]
    fn check_passes_success_through() {
        let out = check("git", &["status"], CommandOutput::ok("clean")).unwrap();
        assert_eq!(out.stdout, "clean");
    }

    #[test]
    fn check_maps_failure() {
        let err = check("git", &["push"], CommandOutput::failed(128, "denied")).unwrap_err();
        assert!(matches!(err, VcsError::CommandFailed { code: Some(128), .. }));
    }

    #[test]
    fn system_runner_captures_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemRunner
            .run("sh", &["-c", "echo hi; exit 3"], dir.path())
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hi");
    }
}
