//! Error types for the land workflow.
//!
//! Defines [`LandError`], the single error type every land step returns.
//! Each variant tells the user what went wrong; variants raised after a
//! failed VCS step also carry the command to run next.

use std::fmt;

use arcland_vcs::VcsError;

use crate::config::ConfigError;
use crate::review::ConduitError;
use crate::submit_queue::SubmitQueueError;

// ---------------------------------------------------------------------------
// LandError
// ---------------------------------------------------------------------------

/// Unified error type for land, compare, and their helpers.
#[derive(Debug)]
pub enum LandError {
    /// A precondition or flag combination does not allow the land.
    Usage {
        /// What to change before trying again.
        message: String,
    },

    /// The user declined a confirmation prompt.
    Aborted {
        /// The prompt or choice that was declined.
        reason: String,
    },

    /// A request to the review server or the submit queue failed.
    Transport {
        /// What was being requested.
        context: String,
        /// The underlying failure.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A server answered with a body that could not be decoded.
    Parse {
        /// What was being decoded.
        context: String,
        /// The decoder error.
        source: serde_json::Error,
    },

    /// A VCS command failed.
    Vcs {
        /// Recovery steps, when the failure leaves something for the user to do.
        hint: Option<String>,
        /// The command failure.
        source: VcsError,
    },

    /// Configuration could not be loaded.
    Config(ConfigError),

    /// A local file operation failed.
    Io(std::io::Error),
}

impl LandError {
    /// A [`LandError::Usage`] with `message`.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// A [`LandError::Aborted`] for the declined `reason`.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// A [`LandError::Vcs`] with recovery steps attached.
    pub fn vcs_with_hint(source: VcsError, hint: impl Into<String>) -> Self {
        Self::Vcs {
            hint: Some(hint.into()),
            source,
        }
    }

    /// Process exit code: 2 for a user abort, 1 for everything else.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Aborted { .. } => 2,
            _ => 1,
        }
    }

    /// Whether this is a user abort.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Whether this is a usage error.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }
}

impl fmt::Display for LandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage { message } => write!(f, "{message}"),
            Self::Aborted { reason } => write!(f, "User aborted the workflow: {reason}"),
            Self::Transport { context, source } => write!(f, "{context}: {source}"),
            Self::Parse { context, source } => write!(f, "{context}: {source}"),
            Self::Vcs { hint, source } => {
                write!(f, "{source}")?;
                if let Some(hint) = hint {
                    write!(f, "\n  To fix: {hint}")?;
                }
                Ok(())
            }
            Self::Config(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for LandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source.as_ref()),
            Self::Parse { source, .. } => Some(source),
            Self::Vcs { source, .. } => Some(source),
            Self::Config(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Usage { .. } | Self::Aborted { .. } => None,
        }
    }
}

impl From<VcsError> for LandError {
    fn from(source: VcsError) -> Self {
        match source {
            VcsError::Diverged { message } => Self::Usage { message },
            source => Self::Vcs { hint: None, source },
        }
    }
}

impl From<std::io::Error> for LandError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ConfigError> for LandError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<ConduitError> for LandError {
    fn from(err: ConduitError) -> Self {
        Self::Transport {
            context: format!("review server call `{}` failed", err.method()),
            source: Box::new(err),
        }
    }
}

impl From<SubmitQueueError> for LandError {
    fn from(err: SubmitQueueError) -> Self {
        match err {
            SubmitQueueError::InvalidJson { source, .. } => Self::Parse {
                context: "Host returned HTTP/200, but invalid JSON data in response to a \
                          SubmitQueue method call"
                    .to_owned(),
                source,
            },
            other => Self::Transport {
                context: "submit queue request failed".to_owned(),
                source: Box::new(other),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_usage_is_message_only() {
        let err = LandError::usage("Branch 'nope' does not exist.");
        assert_eq!(err.to_string(), "Branch 'nope' does not exist.");
        assert!(err.is_usage());
    }

    #[test]
    fn aborted_exits_two() {
        let err = LandError::aborted("Continue anyway?");
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("Continue anyway?"));
    }

    #[test]
    fn other_errors_exit_one() {
        assert_eq!(LandError::usage("x").exit_code(), 1);
        let io = LandError::from(std::io::Error::other("disk"));
        assert_eq!(io.exit_code(), 1);
    }

    #[test]
    fn display_vcs_with_hint() {
        let err = LandError::vcs_with_hint(
            VcsError::CommandFailed {
                command: "git rebase master feature".to_owned(),
                code: Some(1),
                stdout: String::new(),
                stderr: "CONFLICT (content)".to_owned(),
            },
            "resolve the conflicts, then run 'arcland land' again",
        );
        let msg = err.to_string();
        assert!(msg.contains("git rebase master feature"));
        assert!(msg.contains("To fix: resolve the conflicts"));
    }

    #[test]
    fn diverged_bookmark_becomes_usage() {
        let err = LandError::from(VcsError::Diverged {
            message: "Local bookmark master has diverged".to_owned(),
        });
        assert!(err.is_usage());
    }

    #[test]
    fn invalid_queue_json_is_a_parse_error() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = LandError::from(SubmitQueueError::InvalidJson {
            body: "{".to_owned(),
            source,
        });
        assert!(matches!(err, LandError::Parse { .. }));
        assert!(err.to_string().starts_with("Host returned HTTP/200"));
    }

    #[test]
    fn queue_status_is_a_transport_error() {
        let err = LandError::from(SubmitQueueError::Status {
            status: 500,
            body: "boom".to_owned(),
        });
        assert!(matches!(err, LandError::Transport { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }
}
