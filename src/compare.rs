//! `arcland compare`: check that a landed commit matches what was reviewed.

use std::path::{Path, PathBuf};

use arcland_vcs::RepositoryApi;
use tracing::{info, instrument};

use crate::error::LandError;
use crate::normalize::{NormalizeOptions, normalize};
use crate::report::Reporter;
use crate::review::{ReviewClient, Revision};
use crate::revision::revision_ids_in_message;

/// Options of one `arcland compare` run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// The commit to check.
    pub commit: String,
    /// The revision to compare with; read from the commit message when
    /// `None`.
    pub revision: Option<u64>,
    /// Write both normalized patches into this directory.
    pub keep_diffs: Option<PathBuf>,
    /// Keep hunk line numbers instead of collapsing them.
    pub no_normalize_line_numbers: bool,
}

/// Result of a comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// The commit carries the reviewed content.
    Matched {
        /// Revision id.
        revision: u64,
        /// Diff compared with.
        diff: u64,
    },
    /// The commit differs from the reviewed content.
    Mismatched {
        /// Revision id.
        revision: u64,
        /// Diff compared with.
        diff: u64,
        /// A `diff` invocation over the kept patches, with `--keep-diffs`.
        diff_command: Option<String>,
    },
    /// No revision was given and the commit message names none.
    NoRevision,
}

impl Comparison {
    /// 0 matched, 2 no revision, 3 mismatched.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Matched { .. } => 0,
            Self::NoRevision => 2,
            Self::Mismatched { .. } => 3,
        }
    }
}

/// Compare `options.commit` with its revision's latest diff.
///
/// # Errors
/// [`LandError::Usage`] for an unknown revision, review-server errors, VCS
/// errors, or an I/O error writing kept diffs.
#[instrument(skip(repo, review, reporter), fields(commit = %options.commit))]
pub fn compare(
    repo: &dyn RepositoryApi,
    review: ReviewClient<'_>,
    options: &CompareOptions,
    reporter: &dyn Reporter,
) -> Result<Comparison, LandError> {
    let commit = options.commit.as_str();
    let parent = format!("{commit}~1");

    let revision_id = match options.revision {
        Some(id) => Some(id),
        None => repo
            .range_commits(&parent, commit)?
            .first()
            .and_then(|entry| revision_ids_in_message(&entry.message).last().copied()),
    };
    let Some(revision_id) = revision_id else {
        reporter.line(&format!("No revision found for commit {commit}.  Exiting"));
        return Ok(Comparison::NoRevision);
    };

    let revision = load_revision(review, revision_id)?;
    let diff = revision.latest_diff().ok_or_else(|| {
        LandError::usage(format!("Revision {} has no diffs.", revision.monogram()))
    })?;

    let normalize_options = NormalizeOptions {
        collapse_line_numbers: !options.no_normalize_line_numbers,
        ..NormalizeOptions::tolerant()
    };
    let landed = normalize(&repo.full_diff(&parent, commit)?, normalize_options);
    let reviewed = normalize(&review.raw_diff(diff)?, normalize_options);
    let name = if revision.uri.is_empty() {
        revision.monogram()
    } else {
        revision.uri.clone()
    };

    if landed == reviewed {
        info!(revision = revision_id, diff, "content matched");
        reporter.line(&format!(
            "GOOD: Content matched. Compared commit {commit} with revision {name}, diff {diff}"
        ));
        return Ok(Comparison::Matched {
            revision: revision_id,
            diff,
        });
    }

    info!(revision = revision_id, diff, "content did not match");
    let diff_command = match &options.keep_diffs {
        Some(dir) => Some(keep_diffs(dir, commit, revision_id, &landed, &reviewed)?),
        None => None,
    };
    let mut message = format!(
        "BAD: Content did not match.  Compared commit {commit} with revision {name}, diff {diff}"
    );
    if let Some(command) = &diff_command {
        message.push_str(". ");
        message.push_str(command);
    }
    reporter.line(&message);
    Ok(Comparison::Mismatched {
        revision: revision_id,
        diff,
        diff_command,
    })
}

fn load_revision(review: ReviewClient<'_>, id: u64) -> Result<Revision, LandError> {
    let mut revisions = review.revisions_by_id(&[id])?;
    match revisions.len() {
        0 => Err(LandError::usage(format!("No such revision 'D{id}'!"))),
        1 => Ok(revisions.remove(0)),
        n => Err(LandError::usage(format!(
            "More than one revision found.  Found {n} revisions for revision ID {id}. \
             Expected 1."
        ))),
    }
}

fn keep_diffs(
    dir: &Path,
    commit: &str,
    revision: u64,
    landed: &str,
    reviewed: &str,
) -> Result<String, LandError> {
    let landed_path = dir.join(format!("{commit}-{revision}-landed-commit.diff"));
    let reviewed_path = dir.join(format!("{commit}-{revision}-reviewed.diff"));
    std::fs::write(&landed_path, landed)?;
    std::fs::write(&reviewed_path, reviewed)?;
    Ok(format!(
        "diff {} {}",
        landed_path.display(),
        reviewed_path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(Comparison::Matched { revision: 1, diff: 2 }.exit_code(), 0);
        assert_eq!(Comparison::NoRevision.exit_code(), 2);
        let bad = Comparison::Mismatched {
            revision: 1,
            diff: 2,
            diff_command: None,
        };
        assert_eq!(bad.exit_code(), 3);
    }

    #[test]
    fn kept_diffs_are_named_after_commit_and_revision() {
        let dir = tempfile::tempdir().unwrap();
        let command = keep_diffs(dir.path(), "abc123", 42, "landed\n", "reviewed\n").unwrap();
        let landed = dir.path().join("abc123-42-landed-commit.diff");
        let reviewed = dir.path().join("abc123-42-reviewed.diff");
        assert_eq!(std::fs::read_to_string(&landed).unwrap(), "landed\n");
        assert_eq!(std::fs::read_to_string(&reviewed).unwrap(), "reviewed\n");
        assert_eq!(
            command,
            format!("diff {} {}", landed.display(), reviewed.display())
        );
    }
}
