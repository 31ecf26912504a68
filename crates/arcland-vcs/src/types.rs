//! Value types shared by the [`RepositoryApi`](crate::RepositoryApi) trait and
//! its callers. They carry no backend state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Backend / Capabilities
// ---------------------------------------------------------------------------

/// Which VCS drives the working copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// git, optionally backed by Subversion through git-svn.
    Git,
    /// Mercurial.
    Mercurial,
}

impl Backend {
    /// Short command name (`git` / `hg`).
    #[must_use]
    pub const fn command(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Mercurial => "hg",
        }
    }

    /// The target used when neither a flag, the upstream chain, nor config
    /// names one.
    #[must_use]
    pub const fn default_onto(self) -> &'static str {
        match self {
            Self::Git => "master",
            Self::Mercurial => "default",
        }
    }

    /// The remote used when neither a flag nor the upstream chain names one.
    /// An empty string means "the backend's default path".
    #[must_use]
    pub const fn default_remote(self) -> &'static str {
        match self {
            Self::Git => "origin",
            Self::Mercurial => "",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// Optional features of a working copy, probed once when it is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// History rewriting through rebase is available.
    pub rebase: bool,
    /// The repository tracks commit phases (draft/public).
    pub phases: bool,
    /// Lightweight bookmarks are available.
    pub bookmarks: bool,
    /// The remote is a Subversion server.
    pub subversion: bool,
}

// ---------------------------------------------------------------------------
// Refs
// ---------------------------------------------------------------------------

/// Whether a name refers to a branch or a bookmark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// A named branch (git branch, hg named branch).
    Branch,
    /// An hg bookmark.
    Bookmark,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::Bookmark => write!(f, "bookmark"),
        }
    }
}

/// A branch on a named remote.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteBranch {
    /// Remote name, e.g. `origin`.
    pub remote: String,
    /// Branch name on that remote.
    pub branch: String,
}

/// The chain of upstream tracking links starting at a local branch.
///
/// `hops` lists the local branches visited in order (the start branch first).
/// Following stops at the first remote branch, at a branch with no upstream,
/// or when a local branch repeats.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpstreamPath {
    /// Local branches visited, starting branch first.
    pub hops: Vec<String>,
    /// The remote branch the chain ends at, if any.
    pub remote: Option<RemoteBranch>,
    /// Set when a local branch repeated; holds the repeating cycle.
    pub cycle: Option<Vec<String>>,
}

impl UpstreamPath {
    /// Whether the chain loops back on itself.
    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        self.cycle.is_some()
    }

    /// Whether the chain reaches a remote branch.
    #[must_use]
    pub const fn is_connected_to_remote(&self) -> bool {
        self.remote.is_some() && self.cycle.is_none()
    }
}

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

/// One line of `log --oneline` style output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSummary {
    /// Abbreviated commit id.
    pub id: String,
    /// First line of the message.
    pub summary: String,
}

impl fmt::Display for CommitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.summary)
    }
}

/// A commit with its full hash and message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Full commit id.
    pub id: String,
    /// Full commit message.
    pub message: String,
}

/// A line of development that shares commits with the branch being squashed
/// but continues from a point before its tip. Squashing would strand it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fork {
    /// Branch or bookmark name, when the fork has one.
    pub name: Option<String>,
    /// The fork's tip (git) or root (hg) commit.
    pub commit: String,
    /// The commit the fork leaves the landing branch at (git only).
    pub base: Option<String>,
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", short(&self.commit)),
            None => f.write_str(short(&self.commit)),
        }
    }
}

fn short(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// What a squash left behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SquashOutcome {
    /// Changes are staged on the target; a commit is still required.
    Staged,
    /// The backend already recorded the squashed commit.
    Committed,
}

// ---------------------------------------------------------------------------
// Working copy
// ---------------------------------------------------------------------------

/// Paths with uncommitted changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkingCopyState {
    /// Paths whose changes are fully staged.
    pub staged: Vec<String>,
    /// Paths with unstaged, unresolved, or untracked changes.
    pub unstaged: Vec<String>,
}

impl WorkingCopyState {
    /// No changes of any kind.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty()
    }

    /// Every dirty path, sorted.
    #[must_use]
    pub fn all_paths(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .staged
            .iter()
            .chain(self.unstaged.iter())
            .cloned()
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

/// Everything needed to put a working copy back the way it was before a land
/// started mutating it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// The ref (or detached commit) checked out when the land began.
    pub original_ref: String,
    /// The target ref name.
    pub onto: String,
    /// The target's commit at snapshot time.
    pub onto_commit: String,
    /// The source ref name.
    pub source: String,
    /// The source's commit at snapshot time.
    pub source_commit: String,
    /// Every local branch (git) or bookmark (hg) and the commit it named.
    pub refs: BTreeMap<String, String>,
    /// Repository heads at snapshot time (hg only).
    pub heads: Vec<String>,
    /// A bundle holding the source's commits, for backends whose rewrites
    /// discard the originals.
    pub backup: Option<PathBuf>,
}
