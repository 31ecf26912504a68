//! Checks that must pass before a land touches the working copy.

use arcland_vcs::{Backend, RefKind, RepositoryApi};
use tracing::{debug, instrument};

use crate::error::LandError;
use crate::target::LandTarget;

/// What is being landed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LandSource {
    /// Branch or bookmark name.
    pub name: String,
    /// Whether `name` is a branch or a bookmark.
    pub kind: RefKind,
}

/// Run the pre-mutation checks in order:
/// 1. the source is not the target
/// 2. under Mercurial, source and target are the same kind of ref, and a
///    squash has the rebase extension available
/// 3. the source exists
/// 4. the working copy is clean
///
/// # Errors
/// Returns [`LandError::Usage`] naming the first failed check.
#[instrument(skip_all, fields(source = %source.name, onto = %target.onto))]
pub fn validate(
    repo: &dyn RepositoryApi,
    source: &LandSource,
    target: &LandTarget,
    squash: bool,
    history_immutable: bool,
) -> Result<(), LandError> {
    if source.name == target.onto {
        let mut message = format!(
            "You can not land a {} onto itself -- you are trying to land '{}' onto '{}'.",
            source.kind, source.name, target.onto
        );
        if !history_immutable {
            message.push_str(" You may be able to amend the commit and push it directly instead.");
        }
        return Err(LandError::usage(message));
    }

    if repo.backend() == Backend::Mercurial {
        if squash && !repo.capabilities().rebase {
            return Err(LandError::usage(
                "You must enable the rebase extension to use the --squash strategy.",
            ));
        }
        if source.kind != target.onto_kind {
            return Err(LandError::usage(format!(
                "Source {src} is a {sk} but destination {dst} is a {dk}. When landing a {sk}, \
                 the destination must also be a {sk}. Use --onto to specify a {sk}, or set \
                 land.onto_default in .arcland.toml.",
                src = source.name,
                sk = source.kind,
                dst = target.onto,
                dk = target.onto_kind,
            )));
        }
    }

    if repo.resolve(&source.name)?.is_none() {
        return Err(LandError::usage(format!(
            "{} '{}' does not exist.",
            capitalize(&source.kind.to_string()),
            source.name
        )));
    }

    require_clean(repo, "before landing")
}

/// Fail unless the working copy has no uncommitted or untracked changes.
///
/// # Errors
/// Returns [`LandError::Usage`] listing the dirty paths.
pub fn require_clean(repo: &dyn RepositoryApi, when: &str) -> Result<(), LandError> {
    let state = repo.working_copy_state()?;
    if state.is_clean() {
        debug!(when, "working copy clean");
        return Ok(());
    }
    Err(LandError::usage(dirty_message(when, &state.all_paths())))
}

/// Fail if anything is modified but not staged, or untracked. Staged
/// changes are expected right before a commit.
///
/// # Errors
/// Returns [`LandError::Usage`] listing the offending paths.
pub fn require_no_unstaged(repo: &dyn RepositoryApi, when: &str) -> Result<(), LandError> {
    let state = repo.working_copy_state()?;
    if state.unstaged.is_empty() {
        return Ok(());
    }
    Err(LandError::usage(dirty_message(when, &state.unstaged)))
}

fn dirty_message(when: &str, paths: &[String]) -> String {
    let mut message = format!(
        "Working copy has uncommitted changes {when}. Commit, stash, or revert them and \
         try again:\n"
    );
    for path in paths {
        message.push_str("\n    ");
        message.push_str(path);
    }
    message
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_message_lists_paths() {
        let msg = dirty_message("before push", &["a.rs".to_owned(), "b.rs".to_owned()]);
        assert!(msg.contains("before push"));
        assert!(msg.ends_with("\n    a.rs\n    b.rs"));
    }

    #[test]
    fn capitalizes_kind() {
        assert_eq!(capitalize("branch"), "Branch");
        assert_eq!(capitalize(""), "");
    }
}
