//! Finding the one revision a land publishes, and the policy gates it must
//! pass.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::LazyLock;

use arcland_vcs::{Backend, RefKind, RepositoryApi};
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::config::{GateConfig, GatePolicy, LandConfig};
use crate::error::LandError;
use crate::normalize::{NormalizeOptions, normalize};
use crate::preflight::LandSource;
use crate::prompt::{Prompter, confirm_or_abort};
use crate::report::Reporter;
use crate::review::{ReviewClient, Revision, RevisionStatus, User};

static REVISION_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Differential Revision:\s*(?:\S*/)?D(\d+)\s*$")
        .expect("revision field regex is valid")
});

/// Revision ids named by `Differential Revision:` lines, in order.
#[must_use]
pub fn revision_ids_in_message(message: &str) -> Vec<u64> {
    REVISION_FIELD
        .captures_iter(message)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect()
}

/// Which policy checks run, and how strictly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatePolicies {
    /// Fail instead of asking when the revision is not accepted.
    pub prevent_unaccepted: bool,
    /// Compare the local diff with the reviewed diff.
    pub review_check: bool,
    /// Per-gate policies.
    pub gates: GateConfig,
}

impl From<&LandConfig> for GatePolicies {
    fn from(config: &LandConfig) -> Self {
        Self {
            prevent_unaccepted: config.prevent_unaccepted,
            review_check: config.review_check,
            gates: config.gates.clone(),
        }
    }
}

/// A revision that passed every gate.
#[derive(Debug)]
pub struct LocatedRevision {
    /// The revision, as loaded for this attempt.
    pub revision: Revision,
    /// The person running the land.
    pub operator: User,
    /// Commit message for the landed commit, written to a scratch file.
    pub message_file: NamedTempFile,
}

/// Resolves and gates the revision for a land.
pub struct RevisionLocator<'a> {
    repo: &'a dyn RepositoryApi,
    review: ReviewClient<'a>,
    reporter: &'a dyn Reporter,
    policies: GatePolicies,
}

impl<'a> RevisionLocator<'a> {
    /// Locator over `repo` and the review server.
    #[must_use]
    pub fn new(
        repo: &'a dyn RepositoryApi,
        review: ReviewClient<'a>,
        reporter: &'a dyn Reporter,
        policies: GatePolicies,
    ) -> Self {
        Self {
            repo,
            review,
            reporter,
            policies,
        }
    }

    /// Find the revision for `source`, run the gates, and write its commit
    /// message. `base` is the remote-tracking ref of the target.
    ///
    /// # Errors
    /// [`LandError::Usage`] when zero or several revisions match or a
    /// blocking gate fails, [`LandError::Aborted`] when the operator declines
    /// a gate prompt, and transport errors from the review server.
    #[instrument(skip(self, prompter), fields(source = %source.name))]
    pub fn locate(
        &self,
        source: &LandSource,
        base: &str,
        explicit: Option<u64>,
        prompter: &mut dyn Prompter,
    ) -> Result<LocatedRevision, LandError> {
        let revision = self.find(source, base, explicit)?;
        info!(revision = revision.id, status = %revision.status, "revision found");
        let operator = self.review.whoami()?;

        self.check_author(&revision, &operator, source, prompter)?;
        self.check_accepted(&revision, prompter)?;
        if self.policies.review_check {
            self.check_content(&revision, source, base, prompter)?;
        }
        self.check_dependencies(&revision, prompter)?;

        let message = self.review.commit_message(revision.id)?;
        let message_file = self.write_message(&message)?;
        self.reporter
            .line(&format!("Landing revision '{}'...", revision.label()));
        Ok(LocatedRevision {
            revision,
            operator,
            message_file,
        })
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    fn find(
        &self,
        source: &LandSource,
        base: &str,
        explicit: Option<u64>,
    ) -> Result<Revision, LandError> {
        if let Some(id) = explicit {
            return self
                .review
                .revisions_by_id(&[id])?
                .into_iter()
                .next()
                .ok_or_else(|| LandError::usage(format!("No such revision 'D{id}'!")));
        }

        let commits = self.repo.range_commits(base, &source.name)?;
        let tag = match self.repo.backend() {
            Backend::Git => "gtcm",
            Backend::Mercurial => "hgcm",
        };
        let hashes: Vec<String> = commits.iter().map(|c| c.id.clone()).collect();
        let mut ids: Vec<u64> = commits
            .iter()
            .flat_map(|c| revision_ids_in_message(&c.message))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        debug!(commits = hashes.len(), ?ids, "looking up revisions for range");

        let mut found = BTreeMap::new();
        if !hashes.is_empty() {
            for revision in self.review.revisions_by_commit(tag, &hashes)? {
                found.insert(revision.id, revision);
            }
        }
        if !ids.is_empty() {
            for revision in self.review.revisions_by_id(&ids)? {
                found.insert(revision.id, revision);
            }
        }

        let mut revisions: Vec<Revision> = found.into_values().collect();
        match revisions.len() {
            0 => Err(LandError::usage(format!(
                "arcland can not identify which revision exists on {kind} '{name}'. Update the \
                 revision with recent changes to synchronize the {kind} name and hashes, or add \
                 a 'Differential Revision:' line to the commit message, or use '--revision \
                 <id>' to select a revision explicitly.",
                kind = source.kind,
                name = source.name,
            ))),
            1 => Ok(revisions.remove(0)),
            _ => {
                let list: Vec<String> = revisions
                    .iter()
                    .map(|r| format!("  - {}", r.label()))
                    .collect();
                Err(LandError::usage(format!(
                    "There are multiple revisions on feature {kind} '{name}' which are not \
                     present on '{base}':\n\n{list}\n\nSeparate these revisions onto different \
                     {kinds}, or use --revision <id> to use the commit message from <id> and \
                     land them all.",
                    kind = source.kind,
                    name = source.name,
                    list = list.join("\n"),
                    kinds = match source.kind {
                        RefKind::Branch => "branches",
                        RefKind::Bookmark => "bookmarks",
                    },
                )))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Gates
    // -----------------------------------------------------------------------

    fn check_author(
        &self,
        revision: &Revision,
        operator: &User,
        source: &LandSource,
        prompter: &mut dyn Prompter,
    ) -> Result<(), LandError> {
        if revision.author_phid == operator.phid {
            return Ok(());
        }
        let names = self
            .review
            .user_names(std::slice::from_ref(&revision.author_phid))?;
        let author = names
            .get(&revision.author_phid)
            .map_or(revision.author_phid.as_str(), String::as_str);
        let question = format!(
            "This {} has revision '{}' but you are not the author. Land this revision by {author}?",
            source.kind,
            revision.label()
        );
        gate(self.policies.gates.author, prompter, &question)
    }

    fn check_accepted(
        &self,
        revision: &Revision,
        prompter: &mut dyn Prompter,
    ) -> Result<(), LandError> {
        if revision.status == RevisionStatus::Accepted {
            return Ok(());
        }
        if self.policies.prevent_unaccepted {
            return Err(LandError::usage(format!(
                "Revision '{}' has not been accepted.",
                revision.label()
            )));
        }
        confirm_or_abort(
            prompter,
            &format!(
                "Revision '{}' has not been accepted. Continue anyway?",
                revision.label()
            ),
        )
    }

    fn check_content(
        &self,
        revision: &Revision,
        source: &LandSource,
        base: &str,
        prompter: &mut dyn Prompter,
    ) -> Result<(), LandError> {
        if self.repo.backend() != Backend::Git {
            return Err(LandError::usage(
                "'land.review_check' is only supported for git repositories.",
            ));
        }
        let Some(diff_id) = revision.latest_diff() else {
            return Ok(());
        };
        let from = self
            .repo
            .merge_base(base, &source.name)?
            .unwrap_or_else(|| base.to_owned());
        let local = normalize(
            &self.repo.full_diff(&from, &source.name)?,
            NormalizeOptions::default(),
        );
        let reviewed = normalize(&self.review.raw_diff(diff_id)?, NormalizeOptions::default());
        if local == reviewed {
            debug!(diff_id, "local diff matches reviewed diff");
            return Ok(());
        }
        gate(
            self.policies.gates.content,
            prompter,
            "Your working copy changes do not match diff submitted for review. Continue anyway?",
        )
    }

    fn check_dependencies(
        &self,
        revision: &Revision,
        prompter: &mut dyn Prompter,
    ) -> Result<(), LandError> {
        if revision.depends_on.is_empty() {
            return Ok(());
        }
        let open: BTreeMap<u64, String> = self
            .review
            .open_revisions(&revision.depends_on)?
            .into_iter()
            .map(|r| (r.id, r.title))
            .collect();
        if open.is_empty() {
            return Ok(());
        }
        let list: Vec<String> = open
            .iter()
            .map(|(id, title)| format!("    - D{id}: {title}"))
            .collect();
        self.reporter.line(&format!(
            "Revision '{}' depends on open revisions:\n\n{}\n",
            revision.label(),
            list.join("\n")
        ));
        gate(
            self.policies.gates.dependencies,
            prompter,
            "Continue anyway?",
        )
    }

    fn write_message(&self, message: &str) -> Result<NamedTempFile, LandError> {
        let dir = self.repo.scratch_dir()?;
        let mut file = tempfile::Builder::new()
            .prefix("land-message-")
            .tempfile_in(dir)?;
        file.write_all(message.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

/// Apply `policy` to a failed check described by `question`.
fn gate(policy: GatePolicy, prompter: &mut dyn Prompter, question: &str) -> Result<(), LandError> {
    match policy {
        GatePolicy::Prompt => confirm_or_abort(prompter, question),
        GatePolicy::Block => Err(LandError::usage(
            question
                .trim_end_matches(" Continue anyway?")
                .trim_end_matches('?')
                .to_owned()
                + " (blocked by repository policy)",
        )),
    }
}
