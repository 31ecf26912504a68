//! Landing from the working copy.
//!
//! Stages run in order: check out the source, update it from the target,
//! squash or merge it onto the target, commit, push, clean up. A failure in
//! any stage up to and including the push restores the working copy from
//! the snapshot taken before the first checkout.

use std::fmt;

use arcland_vcs::{Fork, RepositoryApi, Snapshot, SquashOutcome, VcsError};
use tracing::{error, info, instrument, warn};

use super::{LandEngine, LandOutcome, LandPlan, Session};
use crate::config::UpdateStrategy;
use crate::error::LandError;
use crate::preflight::{require_clean, require_no_unstaged};
use crate::report::{LandEvent, Reporter};
use crate::strategy::{ForkChoice, Strategy, choose_fork_handling};
use crate::submit_queue::PendingSubmission;

/// Message of the merge commit the merge update step records.
pub const UPDATE_MERGE_MESSAGE: &str = "Automatic merge by 'arcland land'";

/// A step of the local land.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Check out the source.
    CheckoutSource,
    /// Bring the source up to date with the target.
    Update,
    /// Squash or merge the source onto the target.
    Merge,
    /// Record the landed commit.
    Commit,
    /// Publish the target.
    Push,
    /// Delete the source and return to the original ref.
    Cleanup,
}

impl Stage {
    /// Whether a failure in this stage restores the snapshot.
    #[must_use]
    pub const fn rolls_back(self) -> bool {
        !matches!(self, Self::Cleanup)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckoutSource => "checkout",
            Self::Update => "update",
            Self::Merge => "merge",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// What the mutating stages produced.
enum Landed {
    Ready { commit: String, keep: bool },
    Held,
}

/// [`LandEngine`] that merges and pushes locally.
#[derive(Default)]
pub struct LocalLandEngine {
    shadow: Option<PendingSubmission>,
    stage: Option<Stage>,
}

impl LocalLandEngine {
    /// Engine with no shadow submission.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `pending` before pushing. Its result is only logged.
    #[must_use]
    pub fn with_shadow(mut self, pending: PendingSubmission) -> Self {
        self.shadow = Some(pending);
        self
    }

    fn enter(&mut self, stage: Stage) {
        info!(%stage, "land stage");
        self.stage = Some(stage);
    }

    fn land(
        &mut self,
        plan: &LandPlan<'_>,
        session: &mut Session<'_>,
        snapshot: &Snapshot,
    ) -> Result<Landed, LandError> {
        let repo = session.repo;
        let source = plan.source.name.as_str();
        let onto = plan.target.onto.as_str();
        let kind = plan.source.kind;
        let disposition = plan.disposition;

        self.enter(Stage::CheckoutSource);
        repo.checkout(source)?;
        session.reporter.line(&format!(
            "Switched to {kind} **{source}**. Identifying and merging..."
        ));

        let mut keep = disposition.keep_source;
        match disposition.strategy {
            Strategy::Squash => {
                let mut to_rebase: Vec<Fork> = Vec::new();
                if !keep {
                    let forks = repo.forks(source, onto, &snapshot.source_commit)?;
                    if !forks.is_empty() {
                        info!(count = forks.len(), "forks found off the source");
                        match choose_fork_handling(&mut *session.prompter, source, kind, &forks)? {
                            ForkChoice::Keep => keep = true,
                            ForkChoice::Rebase => to_rebase = forks,
                        }
                    }
                }

                self.enter(Stage::Update);
                update(repo, source, onto, disposition.update)?;
                for fork in &to_rebase {
                    repo.rebase_fork(fork, source).map_err(|err| {
                        LandError::vcs_with_hint(
                            err,
                            format!("rebase {fork} onto '{source}' by hand, then run 'arcland land' again"),
                        )
                    })?;
                }

                self.enter(Stage::Merge);
                let outcome = repo.squash(source, onto, plan.message_file).map_err(|err| {
                    LandError::vcs_with_hint(
                        err,
                        format!(
                            "'{source}' does not squash cleanly onto '{onto}'. Update '{source}' \
                             with '{onto}', resolve the conflicts, then run 'arcland land' again"
                        ),
                    )
                })?;
                self.commit(plan, session, outcome)?;
            }
            Strategy::NoFf => {
                self.enter(Stage::Merge);
                repo.merge_no_ff(source, onto).map_err(|err| {
                    LandError::vcs_with_hint(
                        err,
                        format!(
                            "'{source}' does not merge cleanly into '{onto}'. Merge '{onto}' into \
                             '{source}', resolve the conflicts, then run 'arcland land' again"
                        ),
                    )
                })?;
                self.commit(plan, session, SquashOutcome::Staged)?;
            }
        }

        if disposition.strategy == Strategy::Squash && !keep {
            let moved = repo.reparent_children(source, &snapshot.source_commit, onto)?;
            if !moved.is_empty() {
                info!(?moved, "children moved onto the landed commit");
            }
        }

        let commit = repo.resolve(onto)?.ok_or_else(|| VcsError::NotFound {
            message: format!("'{onto}' has no commit after landing"),
        })?;
        session.events.dispatch(&LandEvent::WillPushRevision {
            revision_id: plan.revision.id,
            commit: commit.clone(),
        });

        if disposition.hold {
            return Ok(Landed::Held);
        }

        self.resolve_shadow();
        require_clean(repo, "before push")?;

        self.enter(Stage::Push);
        session.reporter.line("Pushing change...");
        if let Err(err) = repo.push(&plan.target.remote, onto) {
            session.reporter.warn("PUSH FAILED!", "The push was rejected.");
            return Err(LandError::vcs_with_hint(
                err,
                format!(
                    "'{}' failed! Fix the error and run 'arcland land' again.",
                    repo.push_command()
                ),
            ));
        }
        Ok(Landed::Ready { commit, keep })
    }

    fn commit(
        &mut self,
        plan: &LandPlan<'_>,
        session: &Session<'_>,
        outcome: SquashOutcome,
    ) -> Result<(), LandError> {
        self.enter(Stage::Commit);
        require_no_unstaged(session.repo, "before commit")?;
        if outcome == SquashOutcome::Staged {
            session.repo.commit(plan.message_file)?;
        }
        Ok(())
    }

    fn resolve_shadow(&mut self) {
        let Some(pending) = self.shadow.take() else {
            return;
        };
        match pending.resolve() {
            Ok(url) => info!(%url, "shadow submit queue request accepted"),
            Err(err) => warn!(error = %err, "shadow submit queue request failed"),
        }
    }

    fn cleanup(&mut self, plan: &LandPlan<'_>, session: &Session<'_>, keep: bool) {
        self.enter(Stage::Cleanup);
        let repo = session.repo;
        let reporter = session.reporter;
        let source = plan.source.name.as_str();
        let onto = plan.target.onto.as_str();

        if !keep && source != onto {
            reporter.line("Cleaning up feature branch...");
            match repo.delete_source(source, onto) {
                Ok(Some(hint)) => reporter.line(&format!("(Use `{hint}` if you want it back.)")),
                Ok(None) => {}
                Err(err) => cleanup_failed(reporter, &err),
            }
            if plan.disposition.delete_remote {
                match repo.delete_remote_source(&plan.target.remote, source) {
                    Ok(true) => reporter.line("Cleaning up remote feature branch..."),
                    Ok(false) => reporter.line("No remote feature branch to clean up."),
                    Err(err) => cleanup_failed(reporter, &err),
                }
            }
        }

        let original = plan.original_ref;
        if original != onto
            && (keep || original != source)
            && let Err(err) = repo.return_to(original)
        {
            cleanup_failed(reporter, &err);
        }
    }
}

fn update(
    repo: &dyn RepositoryApi,
    source: &str,
    onto: &str,
    strategy: UpdateStrategy,
) -> Result<(), LandError> {
    let result = match strategy {
        UpdateStrategy::Rebase => repo.rebase_source(source, onto),
        UpdateStrategy::Merge => repo.merge_target_into_source(source, onto, UPDATE_MERGE_MESSAGE),
    };
    let Err(err) = result else {
        return Ok(());
    };
    if let Err(abort) = repo.abort_update() {
        warn!(error = %abort, "could not abort the update");
    }
    let vcs = repo.backend().command();
    let hint = match strategy {
        UpdateStrategy::Rebase => format!(
            "'{source}' does not rebase cleanly onto '{onto}'. Run `{vcs} rebase {onto}` on \
             '{source}', resolve the conflicts (`{vcs} rebase --continue`, or `{vcs} rebase \
             --abort` to give up), then run 'arcland land' again"
        ),
        UpdateStrategy::Merge => format!(
            "'{onto}' does not merge cleanly into '{source}'. Run `{vcs} merge {onto}` on \
             '{source}', resolve the conflicts (or `{vcs} merge --abort` to give up), then \
             run 'arcland land' again"
        ),
    };
    Err(LandError::vcs_with_hint(err, hint))
}

fn cleanup_failed(reporter: &dyn Reporter, err: &VcsError) {
    warn!(error = %err, "cleanup step failed after push");
    reporter.warn("CLEANUP", &format!("The change was pushed, but cleanup failed: {err}"));
}

impl LandEngine for LocalLandEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip_all, fields(source = %plan.source.name, onto = %plan.target.onto))]
    fn execute(
        &mut self,
        plan: &LandPlan<'_>,
        session: &mut Session<'_>,
    ) -> Result<LandOutcome, LandError> {
        let repo = session.repo;
        let snapshot = repo.snapshot(plan.original_ref, &plan.source.name, &plan.target.onto)?;
        self.stage = None;

        match self.land(plan, session, &snapshot) {
            Ok(Landed::Held) => {
                session.reporter.line(&format!(
                    "Holding change in **{}**: it has NOT been pushed yet.",
                    plan.target.onto
                ));
                Ok(LandOutcome::Held)
            }
            Ok(Landed::Ready { commit, keep }) => {
                self.cleanup(plan, session, keep);
                Ok(LandOutcome::Pushed { commit })
            }
            Err(err) => {
                if self.stage.is_some_and(Stage::rolls_back) {
                    rollback(repo, session.reporter, &snapshot, self.stage);
                }
                Err(err)
            }
        }
    }
}

fn rollback(
    repo: &dyn RepositoryApi,
    reporter: &dyn Reporter,
    snapshot: &Snapshot,
    stage: Option<Stage>,
) {
    warn!(?stage, "land failed, restoring working copy");
    reporter.warn("ROLLBACK", "Restoring the working copy to its state before the land.");
    if let Err(err) = repo.restore(snapshot) {
        error!(error = %err, "restore failed");
        reporter.warn(
            "ROLLBACK FAILED",
            &format!(
                "Could not restore '{}' at {} and '{}' at {}: {err}",
                snapshot.source, snapshot.source_commit, snapshot.onto, snapshot.onto_commit
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stage_but_cleanup_rolls_back() {
        for stage in [
            Stage::CheckoutSource,
            Stage::Update,
            Stage::Merge,
            Stage::Commit,
            Stage::Push,
        ] {
            assert!(stage.rolls_back(), "{stage}");
        }
        assert!(!Stage::Cleanup.rolls_back());
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::CheckoutSource < Stage::Update);
        assert!(Stage::Commit < Stage::Push);
        assert!(Stage::Push < Stage::Cleanup);
    }
}
