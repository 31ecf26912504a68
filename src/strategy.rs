//! How a land combines the source with the target.
//!
//! The update step (rebase or merge the target into the source) and the
//! final step (squash onto the target, or an explicit merge commit) are
//! chosen independently. Hold, keep, and preview ride along.

use std::fmt;

use arcland_vcs::{Backend, Fork, RefKind};

use crate::config::{LandConfig, UpdateStrategy};
use crate::error::LandError;
use crate::prompt::{Decision, Prompter};

/// How the source's commits end up on the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// One commit on the target carrying the review message.
    Squash,
    /// A merge commit on the target carrying the review message.
    NoFf,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::NoFf => write!(f, "no-ff merge"),
        }
    }
}

/// Strategy-related command-line flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct StrategyFlags {
    /// `--squash`.
    pub squash: bool,
    /// `--merge`.
    pub merge: bool,
    /// `--update-with-rebase`.
    pub update_with_rebase: bool,
    /// `--update-with-merge`.
    pub update_with_merge: bool,
    /// `--hold`.
    pub hold: bool,
    /// `--keep-branch`.
    pub keep_branch: bool,
    /// `--preview`.
    pub preview: bool,
    /// `--delete-remote`.
    pub delete_remote: bool,
}

/// The resolved plan for combining source and target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct MergeDisposition {
    /// Final step.
    pub strategy: Strategy,
    /// Update step. Only used by [`Strategy::Squash`].
    pub update: UpdateStrategy,
    /// Stop before the push.
    pub hold: bool,
    /// Keep the source after landing.
    pub keep_source: bool,
    /// Stop after listing the commits that would land.
    pub preview: bool,
    /// Delete the source on the remote after landing.
    pub delete_remote: bool,
}

impl MergeDisposition {
    /// Resolve flags against repository policy.
    ///
    /// # Errors
    /// [`LandError::Usage`] for conflicting flags or flags the backend does
    /// not support.
    pub fn resolve(
        flags: &StrategyFlags,
        config: &LandConfig,
        backend: Backend,
    ) -> Result<Self, LandError> {
        if flags.merge && flags.squash {
            return Err(LandError::usage(
                "--merge and --squash are conflicting merge strategies.",
            ));
        }
        if flags.update_with_rebase && flags.update_with_merge {
            return Err(LandError::usage(
                "--update-with-rebase cannot be used with --update-with-merge.",
            ));
        }
        if flags.merge && (flags.update_with_rebase || flags.update_with_merge) {
            return Err(LandError::usage(
                "The --merge strategy does not update the feature branch.",
            ));
        }
        if flags.delete_remote && flags.keep_branch {
            return Err(LandError::usage(
                "--delete-remote cannot be used with --keep-branch.",
            ));
        }
        if backend == Backend::Mercurial {
            if flags.merge {
                return Err(LandError::usage(
                    "--merge is not supported under hg. Use the --squash strategy when landing \
                     in mercurial.",
                ));
            }
            for (set, name) in [
                (flags.update_with_rebase, "--update-with-rebase"),
                (flags.update_with_merge, "--update-with-merge"),
            ] {
                if set {
                    return Err(LandError::usage(format!("{name} is not supported under hg.")));
                }
            }
        }

        let strategy = if flags.merge {
            Strategy::NoFf
        } else if flags.squash || backend == Backend::Mercurial {
            Strategy::Squash
        } else if config.history_immutable {
            Strategy::NoFf
        } else {
            Strategy::Squash
        };

        let update = if flags.update_with_rebase || backend == Backend::Mercurial {
            UpdateStrategy::Rebase
        } else if flags.update_with_merge {
            UpdateStrategy::Merge
        } else {
            config.update_default
        };

        Ok(Self {
            strategy,
            update,
            hold: flags.hold,
            keep_source: flags.keep_branch,
            preview: flags.preview,
            delete_remote: flags.delete_remote,
        })
    }
}

// ---------------------------------------------------------------------------
// Forks
// ---------------------------------------------------------------------------

/// What to do with forks a squash would strand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkChoice {
    /// Keep the unsquashed source around so the forks stay attached.
    Keep,
    /// Move the forks onto the source tip before squashing.
    Rebase,
}

/// Ask what to do about `forks`.
///
/// # Errors
/// [`LandError::Aborted`] on abort (the message lists the forks),
/// [`LandError::Usage`] on an unrecognised answer.
pub fn choose_fork_handling(
    prompter: &mut dyn Prompter,
    source: &str,
    kind: RefKind,
    forks: &[Fork],
) -> Result<ForkChoice, LandError> {
    let question = format!(
        "{} '{source}' has {} {kind}(s) forking off of it that would be deleted during a \
         squash. Would you like to keep a non-squashed copy, rebase them on top of \
         '{source}', or abort and deal with them yourself? (k)eep, (r)ebase, (a)bort:",
        capitalized(kind),
        forks.len(),
    );
    let answer = match prompter.ask(&question)? {
        Decision::Choice(answer) => answer.trim().to_ascii_lowercase(),
        Decision::Confirm | Decision::Decline => String::new(),
    };
    match answer.as_str() {
        "k" | "keep" => Ok(ForkChoice::Keep),
        "r" | "rebase" => Ok(ForkChoice::Rebase),
        "a" | "abort" => {
            let list: Vec<String> = forks.iter().map(ToString::to_string).collect();
            Err(LandError::aborted(format!(
                "Remove the {kind}s starting at these revisions and run 'arcland land' \
                 again:\n{}",
                list.join("\n")
            )))
        }
        _ => Err(LandError::usage("Invalid choice. Aborting arcland land.")),
    }
}

const fn capitalized(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Branch => "Branch",
        RefKind::Bookmark => "Bookmark",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPrompter;

    fn resolve(flags: StrategyFlags, config: &LandConfig) -> Result<MergeDisposition, LandError> {
        MergeDisposition::resolve(&flags, config, Backend::Git)
    }

    #[test]
    fn mutable_history_squashes_by_default() {
        let d = resolve(StrategyFlags::default(), &LandConfig::default()).unwrap();
        assert_eq!(d.strategy, Strategy::Squash);
        assert_eq!(d.update, UpdateStrategy::Merge);
    }

    #[test]
    fn immutable_history_merges_by_default() {
        let config = LandConfig {
            history_immutable: true,
            ..LandConfig::default()
        };
        let d = resolve(StrategyFlags::default(), &config).unwrap();
        assert_eq!(d.strategy, Strategy::NoFf);
        let d = resolve(
            StrategyFlags {
                squash: true,
                ..StrategyFlags::default()
            },
            &config,
        )
        .unwrap();
        assert_eq!(d.strategy, Strategy::Squash);
    }

    #[test]
    fn update_flag_overrides_config() {
        let config = LandConfig {
            update_default: UpdateStrategy::Rebase,
            ..LandConfig::default()
        };
        assert_eq!(
            resolve(StrategyFlags::default(), &config).unwrap().update,
            UpdateStrategy::Rebase
        );
        let flags = StrategyFlags {
            update_with_merge: true,
            ..StrategyFlags::default()
        };
        assert_eq!(resolve(flags, &config).unwrap().update, UpdateStrategy::Merge);
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let config = LandConfig::default();
        for flags in [
            StrategyFlags {
                merge: true,
                squash: true,
                ..StrategyFlags::default()
            },
            StrategyFlags {
                update_with_merge: true,
                update_with_rebase: true,
                ..StrategyFlags::default()
            },
            StrategyFlags {
                merge: true,
                update_with_rebase: true,
                ..StrategyFlags::default()
            },
            StrategyFlags {
                delete_remote: true,
                keep_branch: true,
                ..StrategyFlags::default()
            },
        ] {
            assert!(resolve(flags, &config).unwrap_err().is_usage(), "{flags:?}");
        }
    }

    #[test]
    fn mercurial_always_squashes_with_rebase() {
        let config = LandConfig {
            history_immutable: true,
            ..LandConfig::default()
        };
        let d = MergeDisposition::resolve(&StrategyFlags::default(), &config, Backend::Mercurial)
            .unwrap();
        assert_eq!(d.strategy, Strategy::Squash);
        assert_eq!(d.update, UpdateStrategy::Rebase);
        let merge = StrategyFlags {
            merge: true,
            ..StrategyFlags::default()
        };
        assert!(
            MergeDisposition::resolve(&merge, &config, Backend::Mercurial)
                .unwrap_err()
                .is_usage()
        );
    }

    fn forks() -> Vec<Fork> {
        vec![Fork {
            name: Some("side".to_owned()),
            commit: "0123456789abcdef".to_owned(),
            base: None,
        }]
    }

    #[test]
    fn fork_answers() {
        for (answer, expected) in [
            ("k", ForkChoice::Keep),
            ("keep", ForkChoice::Keep),
            ("r", ForkChoice::Rebase),
            ("Rebase", ForkChoice::Rebase),
        ] {
            let mut prompter = ScriptedPrompter::new([Decision::Choice(answer.to_owned())]);
            let choice =
                choose_fork_handling(&mut prompter, "feature", RefKind::Branch, &forks()).unwrap();
            assert_eq!(choice, expected);
        }
    }

    #[test]
    fn fork_abort_lists_forks() {
        let mut prompter = ScriptedPrompter::new([Decision::Choice("a".to_owned())]);
        let err =
            choose_fork_handling(&mut prompter, "feature", RefKind::Branch, &forks()).unwrap_err();
        assert!(err.is_aborted());
        assert!(err.to_string().contains("side (0123456789ab)"));
        assert!(prompter.asked()[0].starts_with("Branch 'feature' has 1 branch(s)"));
    }

    #[test]
    fn fork_invalid_choice() {
        let mut prompter = ScriptedPrompter::new([Decision::Choice("x".to_owned())]);
        let err =
            choose_fork_handling(&mut prompter, "feature", RefKind::Branch, &forks()).unwrap_err();
        assert!(err.is_usage());
        let mut prompter = ScriptedPrompter::new([Decision::Decline]);
        assert!(
            choose_fork_handling(&mut prompter, "feature", RefKind::Branch, &forks())
                .unwrap_err()
                .is_usage()
        );
    }
}
