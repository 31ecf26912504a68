//! Landing through the submit queue.

use tracing::{info, instrument, warn};

use super::{LandEngine, LandOutcome, LandPlan, Session};
use crate::error::LandError;
use crate::submit_queue::{RefProvider, SubmitQueueClient, SubmitRequest};

/// Build the queue request for `plan`.
///
/// # Errors
/// [`LandError::Usage`] when the revision has no diff.
pub fn build_request(
    plan: &LandPlan<'_>,
    refs: &RefProvider,
    shadow: bool,
) -> Result<SubmitRequest, LandError> {
    let diff_id = plan.revision.latest_diff().ok_or_else(|| {
        LandError::usage(format!(
            "Revision {} has no diffs to submit.",
            plan.revision.monogram()
        ))
    })?;
    Ok(SubmitRequest {
        revision_id: plan.revision.id,
        diff_id,
        remote: plan.target.remote.clone(),
        source_ref: plan.source.name.clone(),
        target_ref: plan.target.onto.clone(),
        diff_ref: refs.diff_ref(diff_id),
        base_ref: refs.base_ref(diff_id),
        shadow,
    })
}

/// [`LandEngine`] that hands the change to the submit queue.
pub struct QueueLandEngine {
    client: SubmitQueueClient,
    refs: RefProvider,
    skip_update: bool,
}

impl QueueLandEngine {
    /// With `skip_update`, the target is not fetched after submitting.
    #[must_use]
    pub const fn new(client: SubmitQueueClient, refs: RefProvider, skip_update: bool) -> Self {
        Self {
            client,
            refs,
            skip_update,
        }
    }
}

impl LandEngine for QueueLandEngine {
    fn name(&self) -> &'static str {
        "submit-queue"
    }

    #[instrument(skip_all, fields(revision = plan.revision.id, onto = %plan.target.onto))]
    fn execute(
        &mut self,
        plan: &LandPlan<'_>,
        session: &mut Session<'_>,
    ) -> Result<LandOutcome, LandError> {
        let request = build_request(plan, &self.refs, false)?;
        session.reporter.line(&format!(
            "Submitting {} to the submit queue...",
            plan.revision.monogram()
        ));
        let url = self.client.submit(&request)?;
        info!(%url, "merge request queued");
        session
            .reporter
            .info("QUEUED", &format!("Merge request submitted: {url}"));

        let repo = session.repo;
        if !self.skip_update
            && let Err(err) = repo.fetch(&plan.target.remote, &plan.target.onto)
        {
            warn!(error = %err, "could not refresh the target after queueing");
        }
        if plan.original_ref != plan.target.onto {
            repo.return_to(plan.original_ref)?;
        }
        Ok(LandOutcome::Queued { url })
    }
}
