//! The land workflow: resolve, gate, choose an engine, land, follow up.

use std::time::Duration;

use arcland_vcs::{Backend, CommitSummary, RepositoryApi};
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::buildable::BuildableGate;
use crate::config::ArcConfig;
use crate::engine::{
    LandEngine, LandOutcome, LandPlan, LocalLandEngine, QueueLandEngine, Session, build_request,
};
use crate::error::LandError;
use crate::preflight::{self, LandSource};
use crate::prompt::Prompter;
use crate::report::{EventSink, LandEvent, Reporter};
use crate::review::{Conduit, ReviewClient, Revision};
use crate::revision::{GatePolicies, LocatedRevision, RevisionLocator};
use crate::strategy::{MergeDisposition, Strategy, StrategyFlags};
use crate::submit_queue::{RefProvider, SubmitQueueClient, SubmitQueueError};
use crate::target::{LandTarget, TargetRequest, TargetResolver};
use crate::{tbr, unit};

/// Options of one `arcland land` run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct LandOptions {
    /// Branch or bookmark to land; the checked-out one when `None`.
    pub branch: Option<String>,
    /// `--onto`.
    pub onto: Option<String>,
    /// `--remote`.
    pub remote: Option<String>,
    /// `--revision`.
    pub revision: Option<u64>,
    /// Strategy flags.
    pub strategy: StrategyFlags,
    /// `--tbr`.
    pub tbr: bool,
    /// `--nounit`.
    pub nounit: bool,
    /// `--use-sq`.
    pub use_sq: bool,
    /// `--skip-update`.
    pub skip_update: bool,
}

/// Which engine lands the change, and why.
enum Route {
    Local,
    Shadowed,
    Bypass,
    Queue,
}

/// Drives one land attempt.
pub struct LandWorkflow<'a> {
    repo: &'a dyn RepositoryApi,
    conduit: &'a dyn Conduit,
    config: &'a ArcConfig,
    reporter: &'a dyn Reporter,
}

impl<'a> LandWorkflow<'a> {
    /// Workflow over `repo`, talking to the review server through `conduit`.
    #[must_use]
    pub fn new(
        repo: &'a dyn RepositoryApi,
        conduit: &'a dyn Conduit,
        config: &'a ArcConfig,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            repo,
            conduit,
            config,
            reporter,
        }
    }

    fn review(&self) -> ReviewClient<'a> {
        ReviewClient::new(self.conduit)
    }

    /// Run the land.
    ///
    /// # Errors
    /// Any [`LandError`]. Failures after the working copy was touched leave
    /// it as it was before the run.
    #[instrument(skip_all, fields(branch = ?options.branch, onto = ?options.onto))]
    pub fn run(
        &self,
        options: &LandOptions,
        prompter: &mut dyn Prompter,
        events: &mut dyn EventSink,
    ) -> Result<LandOutcome, LandError> {
        let repo = self.repo;
        let backend = repo.backend();
        self.validate_flags(options, backend)?;
        let disposition = MergeDisposition::resolve(&options.strategy, &self.config.land, backend)?;

        let original_ref = repo.current_ref()?.ok_or_else(|| {
            LandError::usage("Unable to determine what is checked out. Check out a branch to land.")
        })?;
        let source_name = options.branch.clone().unwrap_or_else(|| original_ref.clone());
        let source = LandSource {
            kind: repo.ref_kind(&source_name)?,
            name: source_name,
        };
        let target = TargetResolver::new(repo, self.reporter).resolve(
            &source.name,
            &TargetRequest {
                onto: options.onto.as_deref(),
                remote: options.remote.as_deref(),
                config_onto: self.config.land.onto_default.as_deref(),
            },
        )?;
        preflight::validate(
            repo,
            &source,
            &target,
            disposition.strategy == Strategy::Squash,
            self.config.land.history_immutable,
        )?;

        let located = if disposition.preview {
            None
        } else {
            Some(self.gate(options, &source, &target, prompter)?)
        };

        self.pull(&target, &original_ref)?;
        let return_to_original = |_: &LandError| {
            if let Err(err) = repo.return_to(&original_ref) {
                warn!(error = %err, "could not return to the original ref");
            }
        };
        let pending = repo
            .pending_commits(&source.name, &target.onto)
            .map_err(LandError::from)
            .inspect_err(return_to_original)?;
        if pending.is_empty() {
            repo.return_to(&original_ref)?;
            return Err(LandError::usage(format!(
                "No commits to land from {}.",
                source.name
            )));
        }
        self.reporter.line(&pending_listing(&pending));

        let Some(located) = located else {
            repo.return_to(&original_ref)?;
            return Ok(LandOutcome::Previewed);
        };
        let revision = &located.revision;

        let plan = LandPlan {
            source: &source,
            target: &target,
            disposition,
            original_ref: &original_ref,
            revision,
            message_file: located.message_file.path(),
        };
        let mut engine = self
            .route(options, revision)
            .and_then(|route| self.engine(route, options, &plan, &located, prompter))
            .inspect_err(return_to_original)?;
        info!(engine = engine.name(), "landing");

        // A rolled-back local land is already back on the original ref; a
        // queue failure or a failed snapshot is still on the target.
        let outcome = engine
            .execute(
                &plan,
                &mut Session {
                    repo,
                    reporter: self.reporter,
                    prompter: &mut *prompter,
                    events: &mut *events,
                },
            )
            .inspect_err(return_to_original)?;
        if let LandOutcome::Pushed { commit } = &outcome {
            self.after_push(revision, commit, events)?;
        }
        Ok(outcome)
    }

    fn validate_flags(&self, options: &LandOptions, backend: Backend) -> Result<(), LandError> {
        if backend == Backend::Mercurial {
            for (set, flag) in [
                (options.tbr, "--tbr"),
                (options.use_sq, "--use-sq"),
                (options.skip_update, "--skip-update"),
            ] {
                if set {
                    return Err(LandError::usage(format!("{flag} is not supported under hg.")));
                }
            }
        }
        if options.use_sq && self.config.submit_queue.uri.is_none() {
            return Err(LandError::usage(
                "You are trying to use submitqueue, but the submitqueue URI for your repo is \
                 not set",
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Gates
    // -----------------------------------------------------------------------

    fn gate(
        &self,
        options: &LandOptions,
        source: &LandSource,
        target: &LandTarget,
        prompter: &mut dyn Prompter,
    ) -> Result<LocatedRevision, LandError> {
        let repo = self.repo;
        repo.fetch(&target.remote, &target.onto)?;

        let located = RevisionLocator::new(
            repo,
            self.review(),
            self.reporter,
            GatePolicies::from(&self.config.land),
        )
        .locate(source, &target.remote_branch, options.revision, prompter)?;

        if let Some(diff_phid) = &located.revision.active_diff_phid {
            let strict = self.config.land.buildables_check && !options.tbr;
            BuildableGate::new(self.review(), self.reporter, strict).check(diff_phid, prompter)?;
        }

        let unit = &self.config.land.unit;
        if !options.nounit
            && let Some(command) = unit.command.as_deref()
        {
            unit::run_gate(command, repo.root(), unit.timeout_secs, self.reporter, prompter)?;
        }
        Ok(located)
    }

    fn pull(&self, target: &LandTarget, original_ref: &str) -> Result<(), LandError> {
        let repo = self.repo;
        let restore = |err: LandError| {
            if let Err(restore) = repo.return_to(original_ref) {
                warn!(error = %restore, "could not return to the original ref");
            }
            err
        };

        repo.pull_target(&target.remote, &target.onto)
            .map_err(|err| restore(err.into()))?;
        if repo
            .is_ahead_of_remote(&target.remote, &target.onto)
            .map_err(|err| restore(err.into()))?
        {
            let kind = target.onto_kind;
            return Err(restore(LandError::usage(format!(
                "Local {kind} '{onto}' is ahead of remote {kind} '{remote_branch}', so landing \
                 a feature {kind} would push additional changes. Push or reset the changes in \
                 '{onto}' before running 'arcland land'.",
                onto = target.onto,
                remote_branch = target.remote_branch,
            ))));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Engine selection
    // -----------------------------------------------------------------------

    fn route(&self, options: &LandOptions, revision: &Revision) -> Result<Route, LandError> {
        let queue = &self.config.submit_queue;
        let eligible = self.repo.backend() == Backend::Git
            && !self.repo.capabilities().subversion
            && (queue.enable || options.use_sq);
        if !eligible || !self.touches_queued_paths(revision)? {
            return Ok(Route::Local);
        }
        Ok(if options.tbr {
            Route::Bypass
        } else if queue.shadow {
            Route::Shadowed
        } else {
            Route::Queue
        })
    }

    fn touches_queued_paths(&self, revision: &Revision) -> Result<bool, LandError> {
        let Some(pattern) = self.config.submit_queue.regex.as_deref() else {
            return Ok(true);
        };
        let regex = Regex::new(pattern).map_err(|err| {
            LandError::usage(format!("submit_queue.regex is not a valid regex: {err}"))
        })?;
        let Some(diff_id) = revision.latest_diff() else {
            return Ok(false);
        };
        let paths = self.review().changed_paths(diff_id)?;
        let matched = paths.iter().any(|path| {
            [&path.old_path, &path.current_path]
                .into_iter()
                .flatten()
                .any(|p| regex.is_match(p))
        });
        info!(matched, %pattern, "submit queue path filter");
        Ok(matched)
    }

    fn queue_client(&self) -> Result<SubmitQueueClient, LandError> {
        let queue = &self.config.submit_queue;
        let uri = queue.uri.as_deref().ok_or_else(|| {
            LandError::usage(
                "You are trying to use submitqueue, but the submitqueue URI for your repo is \
                 not set",
            )
        })?;
        SubmitQueueClient::new(
            uri,
            self.config.review.token.clone(),
            Duration::from_secs(queue.timeout_secs),
        )
        .map_err(|err| SubmitQueueError::from(err).into())
    }

    fn refs(&self) -> RefProvider {
        let queue = &self.config.submit_queue;
        RefProvider::new(queue.ref_prefix.clone(), queue.custom_refs)
    }

    fn engine(
        &self,
        route: Route,
        options: &LandOptions,
        plan: &LandPlan<'_>,
        located: &LocatedRevision,
        prompter: &mut dyn Prompter,
    ) -> Result<Box<dyn LandEngine>, LandError> {
        match route {
            Route::Local => Ok(Box::new(LocalLandEngine::new())),
            Route::Bypass => {
                tbr::file_bypass(
                    self.review(),
                    &self.config.submit_queue,
                    &located.revision,
                    &located.operator.user_name,
                    &self.repo.scratch_dir()?,
                    self.reporter,
                    prompter,
                )?;
                Ok(Box::new(LocalLandEngine::new()))
            }
            Route::Shadowed => {
                let request = build_request(plan, &self.refs(), true)?;
                let pending = self.queue_client()?.start(request);
                Ok(Box::new(LocalLandEngine::new().with_shadow(pending)))
            }
            Route::Queue => {
                for (set, flag) in [
                    (options.strategy.delete_remote, "--delete-remote"),
                    (options.strategy.update_with_merge, "--update-with-merge"),
                    (options.strategy.update_with_rebase, "--update-with-rebase"),
                ] {
                    if set {
                        return Err(LandError::usage(format!(
                            "Flag {flag} is not supported when landing through the submit queue."
                        )));
                    }
                }
                Ok(Box::new(QueueLandEngine::new(
                    self.queue_client()?,
                    self.refs(),
                    options.skip_update,
                )))
            }
        }
    }

    // -----------------------------------------------------------------------
    // After the push
    // -----------------------------------------------------------------------

    fn after_push(
        &self,
        revision: &Revision,
        commit: &str,
        events: &mut dyn EventSink,
    ) -> Result<(), LandError> {
        let review = self.review();
        if let Some(repository) = &revision.repository_phid
            && let Err(err) = review.request_repository_update(repository)
        {
            warn!(error = %err, "repository update request failed");
        }
        review.close_revision(revision.id)?;
        info!(revision = revision.id, "revision closed");
        events.dispatch(&LandEvent::DidPushRevision {
            revision_id: revision.id,
            commit: commit.to_owned(),
        });
        Ok(())
    }
}

fn pending_listing(pending: &[CommitSummary]) -> String {
    let mut out = String::from("The following commit(s) will be landed:\n");
    for commit in pending {
        out.push('\n');
        out.push_str(&commit.to_string());
    }
    out
}
