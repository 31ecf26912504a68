//! Error types for version-control operations.
//!
//! [`VcsError`] is the single error type returned by all
//! [`RepositoryApi`](crate::RepositoryApi) methods. Command failures keep the
//! full command line and captured streams so callers can surface them
//! verbatim.

use thiserror::Error;

/// Errors returned by [`RepositoryApi`](crate::RepositoryApi) operations.
#[derive(Debug, Error)]
pub enum VcsError {
    /// A VCS command ran but exited unsuccessfully.
    #[error("`{command}` failed (exit {}): {}", exit_label(*code), stderr.trim())]
    CommandFailed {
        /// The command line, for display.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The VCS binary could not be started at all.
    #[error("could not run `{program}`: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A ref, commit, or path was not found.
    #[error("not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// The backend cannot perform the requested operation.
    #[error("{operation} is not supported for {backend} repositories")]
    Unsupported {
        /// Operation name, e.g. `"no-ff merge"`.
        operation: &'static str,
        /// Backend name.
        backend: &'static str,
    },

    /// The local and remote copies of a ref have diverged.
    #[error("{message}")]
    Diverged {
        /// Human-readable description with the recovery hint.
        message: String,
    },

    /// Command output could not be interpreted.
    #[error("unexpected output from `{command}`: {message}")]
    Parse {
        /// The command whose output was malformed.
        command: String,
        /// What was wrong.
        message: String,
    },

    /// A local file operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_owned(), |c| c.to_string())
}

impl VcsError {
    /// The captured stderr of a failed command, if this is one.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}
