//! CI status check for the revision's active diff.
//!
//! Advisory: a missing buildable, an unknown status, or a failed status
//! query lets the land through.

use tracing::{instrument, warn};

use crate::error::LandError;
use crate::prompt::{Prompter, confirm_or_abort};
use crate::report::Reporter;
use crate::review::{Build, Buildable, ReviewClient};

/// How the check concluded, when it did not fail the land.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildVerdict {
    /// No buildable exists for the diff, or it could not be queried.
    Absent,
    /// Every build passed.
    Passed,
    /// A status this client does not interpret.
    Unrecognized(String),
    /// Builds are running or failed and the operator chose to land anyway.
    Overridden,
}

/// Checks build status before a land.
pub struct BuildableGate<'a> {
    review: ReviewClient<'a>,
    reporter: &'a dyn Reporter,
    strict: bool,
}

impl<'a> BuildableGate<'a> {
    /// With `strict`, running or failed builds fail the land instead of
    /// prompting.
    #[must_use]
    pub fn new(review: ReviewClient<'a>, reporter: &'a dyn Reporter, strict: bool) -> Self {
        Self {
            review,
            reporter,
            strict,
        }
    }

    /// Check the buildable of `diff_phid`.
    ///
    /// # Errors
    /// [`LandError::Usage`] under a strict policy, [`LandError::Aborted`] when
    /// the operator declines, or a transport error listing builds.
    #[instrument(skip(self, prompter))]
    pub fn check(
        &self,
        diff_phid: &str,
        prompter: &mut dyn Prompter,
    ) -> Result<BuildVerdict, LandError> {
        let buildables = match self.review.buildables(diff_phid) {
            Ok(buildables) => buildables,
            Err(err) => {
                warn!(error = %err, "build status unavailable, skipping check");
                return Ok(BuildVerdict::Absent);
            }
        };
        let Some(buildable) = buildables.into_iter().next() else {
            return Ok(BuildVerdict::Absent);
        };

        let (message, prompt) = match buildable.status.as_str() {
            "passed" => {
                self.reporter.info(
                    "BUILDS PASSED",
                    "Harbormaster builds for the active diff completed successfully.",
                );
                return Ok(BuildVerdict::Passed);
            }
            "building" => (
                "Harbormaster is still building the active diff for this revision:",
                "Land revision anyway, despite ongoing build?",
            ),
            "failed" => (
                "Harbormaster failed to build the active diff for this revision. Build failures:",
                "Land revision anyway, despite build failures?",
            ),
            other => return Ok(BuildVerdict::Unrecognized(other.to_owned())),
        };

        let builds = self.review.builds(&buildable.phid)?;
        self.reporter.line(&render(message, &builds, &buildable));

        if self.strict {
            return Err(LandError::usage(
                "All harbormaster buildables have not succeeded. This repository requires \
                 passing builds before landing; wait for the builds or fix them, or land \
                 with --tbr.",
            ));
        }
        confirm_or_abort(prompter, prompt)?;
        Ok(BuildVerdict::Overridden)
    }
}

fn render(message: &str, builds: &[Build], buildable: &Buildable) -> String {
    let mut out = format!("{message}\n\n");
    for build in builds {
        out.push_str(&format!(
            "    {} Build {}: {}\n",
            build.status_name.to_uppercase(),
            build.id,
            build.name
        ));
    }
    out.push_str(&format!(
        "\nYou can review build details here:\n\n    Harbormaster URI: {}\n",
        buildable.uri
    ));
    out
}
