//! Version-control abstraction layer for arcland.
//!
//! This crate defines the [`RepositoryApi`] trait, the single interface the
//! land workflow uses to query and mutate a working copy. Two backends are
//! provided, both driving the VCS command line through a [`Runner`]:
//!
//! - [`GitRepository`] for git (including git-svn clones).
//! - [`HgRepository`] for Mercurial.
//!
//! # Crate layout
//!
//! - [`repo`] — the [`RepositoryApi`] trait definition.
//! - [`types`] — value types used in trait signatures.
//! - [`exec`] — the [`Runner`] process seam and its system implementation.
//! - [`error`] — the [`VcsError`] enum returned by all trait methods.

pub mod error;
pub mod exec;
pub mod repo;
pub mod types;

mod git;
mod hg;

pub use error::VcsError;
pub use exec::{CommandOutput, Runner, SystemRunner};
pub use git::GitRepository;
pub use hg::HgRepository;
pub use repo::{RepositoryApi, open, open_with};
pub use types::{
    Backend, Capabilities, CommitSummary, Fork, LogEntry, RefKind, RemoteBranch, Snapshot,
    SquashOutcome, UpstreamPath, WorkingCopyState,
};
