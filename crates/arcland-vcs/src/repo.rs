//! The [`RepositoryApi`] trait: every VCS query and mutation the land workflow
//! performs.
//!
//! Implementations drive the VCS command line. The trait is object-safe so
//! the workflow can hold a `&dyn RepositoryApi` without knowing the backend.

use std::path::{Path, PathBuf};

use crate::error::VcsError;
use crate::exec::{Runner, SystemRunner};
use crate::git::GitRepository;
use crate::hg::HgRepository;
use crate::types::{
    Backend, Capabilities, CommitSummary, Fork, LogEntry, RefKind, Snapshot, SquashOutcome,
    UpstreamPath, WorkingCopyState,
};

/// A working copy that can be landed from.
pub trait RepositoryApi {
    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Which VCS this is.
    fn backend(&self) -> Backend;

    /// Features probed when the repository was opened.
    fn capabilities(&self) -> Capabilities;

    /// Working copy root.
    fn root(&self) -> &Path;

    /// A private directory inside the VCS metadata for temporary files and
    /// history. Created on first use.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    fn scratch_dir(&self) -> Result<PathBuf, VcsError>;

    /// The command shown to users when a push fails (`git push`, `hg push`).
    fn push_command(&self) -> &'static str;

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The checked-out branch or bookmark, or the commit id when detached.
    /// `None` for an unborn history.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn current_ref(&self) -> Result<Option<String>, VcsError>;

    /// Whether `name` is a branch or a bookmark.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn ref_kind(&self, name: &str) -> Result<RefKind, VcsError>;

    /// Resolve a ref or revision expression to a full commit id.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried. An unknown name is
    /// `Ok(None)`.
    fn resolve(&self, spec: &str) -> Result<Option<String>, VcsError>;

    /// Uncommitted changes, including untracked files.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn working_copy_state(&self) -> Result<WorkingCopyState, VcsError>;

    /// Follow upstream tracking links from `branch`.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn upstream_path(&self, branch: &str) -> Result<UpstreamPath, VcsError>;

    /// The ref naming `onto` as last seen on `remote`.
    fn remote_tracking_ref(&self, remote: &str, onto: &str) -> String;

    /// Commits reachable from `source` that are not on `onto`, newest first.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn pending_commits(&self, source: &str, onto: &str) -> Result<Vec<CommitSummary>, VcsError>;

    /// Full commits in `base..head`, newest first.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn range_commits(&self, base: &str, head: &str) -> Result<Vec<LogEntry>, VcsError>;

    /// The best common ancestor of two revisions.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, VcsError>;

    /// A full-context unified diff between two revisions.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn full_diff(&self, base: &str, head: &str) -> Result<String, VcsError>;

    /// Other lines of development that branch off `source` before its tip
    /// and would be stranded by a squash. `source_before` is the source's
    /// commit prior to any update step.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn forks(&self, source: &str, onto: &str, source_before: &str)
    -> Result<Vec<Fork>, VcsError>;

    // -----------------------------------------------------------------------
    // Synchronisation
    // -----------------------------------------------------------------------

    /// Refresh remote-tracking state for `onto` without touching the working
    /// copy. Backends without remote-tracking refs do nothing.
    ///
    /// # Errors
    /// Returns an error if the fetch fails.
    fn fetch(&self, remote: &str, onto: &str) -> Result<(), VcsError>;

    /// Check out `onto` and fast-forward it from `remote`.
    ///
    /// # Errors
    /// Returns [`VcsError::Diverged`] when the local target diverged from the
    /// server, or a command error.
    fn pull_target(&self, remote: &str, onto: &str) -> Result<(), VcsError>;

    /// Whether local `onto` holds commits the remote does not.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn is_ahead_of_remote(&self, remote: &str, onto: &str) -> Result<bool, VcsError>;

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Check out a branch, bookmark, or commit.
    ///
    /// # Errors
    /// Returns an error if the checkout fails.
    fn checkout(&self, name: &str) -> Result<(), VcsError>;

    /// Check out `name` and bring submodules in line with it.
    ///
    /// # Errors
    /// Returns an error if either step fails.
    fn return_to(&self, name: &str) -> Result<(), VcsError>;

    /// Replay `source` on top of `onto`.
    ///
    /// # Errors
    /// Returns a command error on conflicts; the operation is left in
    /// progress for [`abort_update`](Self::abort_update).
    fn rebase_source(&self, source: &str, onto: &str) -> Result<(), VcsError>;

    /// Merge `onto` into the checked-out `source` with `message`.
    ///
    /// # Errors
    /// Returns a command error on conflicts, or [`VcsError::Unsupported`].
    fn merge_target_into_source(
        &self,
        source: &str,
        onto: &str,
        message: &str,
    ) -> Result<(), VcsError>;

    /// Abandon any rebase or merge left in progress.
    ///
    /// # Errors
    /// Returns an error if the abort itself fails.
    fn abort_update(&self) -> Result<(), VcsError>;

    /// Move a fork so it continues from the tip of `source`.
    ///
    /// # Errors
    /// Returns a command error on conflicts.
    fn rebase_fork(&self, fork: &Fork, source: &str) -> Result<(), VcsError>;

    /// Collapse the commits of `source` onto `onto`, leaving `onto` checked
    /// out.
    ///
    /// # Errors
    /// Returns a command error on conflicts.
    fn squash(
        &self,
        source: &str,
        onto: &str,
        message_file: &Path,
    ) -> Result<SquashOutcome, VcsError>;

    /// Merge `source` into `onto` with an explicit merge commit, stopping
    /// before the commit is recorded.
    ///
    /// # Errors
    /// Returns a command error on conflicts, or [`VcsError::Unsupported`].
    fn merge_no_ff(&self, source: &str, onto: &str) -> Result<(), VcsError>;

    /// Record staged changes with the message in `message_file`.
    ///
    /// # Errors
    /// Returns an error if the commit fails.
    fn commit(&self, message_file: &Path) -> Result<(), VcsError>;

    /// Move branches that descend from `source_commit` onto `onto`.
    /// Returns the names of the moved branches.
    ///
    /// # Errors
    /// Returns a command error on conflicts.
    fn reparent_children(
        &self,
        source: &str,
        source_commit: &str,
        onto: &str,
    ) -> Result<Vec<String>, VcsError>;

    /// Publish `onto` to `remote`.
    ///
    /// # Errors
    /// Returns a command error when the push is rejected.
    fn push(&self, remote: &str, onto: &str) -> Result<(), VcsError>;

    /// Capture enough state to undo a land.
    ///
    /// # Errors
    /// Returns an error if the VCS cannot be queried.
    fn snapshot(
        &self,
        original_ref: &str,
        source: &str,
        onto: &str,
    ) -> Result<Snapshot, VcsError>;

    /// Put refs and the working copy back to `snapshot`.
    ///
    /// # Errors
    /// Returns an error if any step of the restore fails.
    fn restore(&self, snapshot: &Snapshot) -> Result<(), VcsError>;

    /// Delete the landed local `source`. Returns a command that would
    /// recreate it.
    ///
    /// # Errors
    /// Returns an error if the deletion fails.
    fn delete_source(&self, source: &str, onto: &str) -> Result<Option<String>, VcsError>;

    /// Delete `source` on `remote`. Returns `false` when there was nothing to
    /// delete.
    ///
    /// # Errors
    /// Returns an error if the remote deletion fails.
    fn delete_remote_source(&self, remote: &str, source: &str) -> Result<bool, VcsError>;
}

/// Open the working copy containing `path`, detecting git or Mercurial.
///
/// # Errors
/// Returns [`VcsError::NotFound`] if `path` is inside neither.
pub fn open(path: &Path) -> Result<Box<dyn RepositoryApi>, VcsError> {
    open_with(path, &SystemRunner)
}

/// [`open`] with an explicit runner.
///
/// # Errors
/// Returns [`VcsError::NotFound`] if `path` is inside neither.
pub fn open_with<R: Runner + Clone + 'static>(
    path: &Path,
    runner: &R,
) -> Result<Box<dyn RepositoryApi>, VcsError> {
    let git = runner.run("git", &["rev-parse", "--show-toplevel"], path);
    if matches!(&git, Ok(out) if out.success()) {
        return Ok(Box::new(GitRepository::with_runner(
            path,
            Box::new(runner.clone()),
        )?));
    }
    let hg = runner.run("hg", &["root"], path);
    if matches!(&hg, Ok(out) if out.success()) {
        return Ok(Box::new(HgRepository::with_runner(
            path,
            Box::new(runner.clone()),
        )?));
    }
    Err(VcsError::NotFound {
        message: format!(
            "{} is not inside a git or Mercurial working copy",
            path.display()
        ),
    })
}
