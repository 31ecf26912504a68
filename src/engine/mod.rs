//! Land engines: what happens once every gate has passed.
//!
//! [`LandEngine`] has two implementations. [`LocalLandEngine`] merges and
//! pushes from the working copy; [`QueueLandEngine`] hands the change to the
//! submit queue. The workflow picks one before anything is mutated.

mod local;
mod queue;

use std::path::Path;

use arcland_vcs::RepositoryApi;

pub use local::LocalLandEngine;
pub use queue::{QueueLandEngine, build_request};

use crate::error::LandError;
use crate::preflight::LandSource;
use crate::prompt::Prompter;
use crate::report::{EventSink, Reporter};
use crate::review::Revision;
use crate::strategy::MergeDisposition;
use crate::target::LandTarget;

/// How a land finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LandOutcome {
    /// The change was pushed as `commit`.
    Pushed {
        /// The landed commit on the target.
        commit: String,
    },
    /// The change is committed locally on the target but not pushed.
    Held,
    /// The submit queue accepted the change.
    Queued {
        /// Where the merge request can be tracked.
        url: String,
    },
    /// Only the pending commits were listed.
    Previewed,
}

impl LandOutcome {
    /// Whether the change reached the remote through this process.
    #[must_use]
    pub const fn was_pushed(&self) -> bool {
        matches!(self, Self::Pushed { .. })
    }
}

/// Everything an engine needs to know about the land.
#[derive(Clone, Copy, Debug)]
pub struct LandPlan<'a> {
    /// What is landing.
    pub source: &'a LandSource,
    /// Where it lands.
    pub target: &'a LandTarget,
    /// How it is combined.
    pub disposition: MergeDisposition,
    /// The ref checked out before the land started.
    pub original_ref: &'a str,
    /// The revision being landed.
    pub revision: &'a Revision,
    /// The commit message file.
    pub message_file: &'a Path,
}

/// Collaborators an engine talks to.
pub struct Session<'a> {
    /// The working copy.
    pub repo: &'a dyn RepositoryApi,
    /// Operator output.
    pub reporter: &'a dyn Reporter,
    /// Operator questions.
    pub prompter: &'a mut dyn Prompter,
    /// Push notifications.
    pub events: &'a mut dyn EventSink,
}

/// Performs a land.
pub trait LandEngine {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Land `plan`. The target has already been pulled and is checked out.
    ///
    /// # Errors
    /// Any failure; engines that mutate the working copy restore it before
    /// returning an error.
    fn execute(
        &mut self,
        plan: &LandPlan<'_>,
        session: &mut Session<'_>,
    ) -> Result<LandOutcome, LandError>;
}
