//! "To be reviewed" bypass of the submit queue.
//!
//! The operator gives an excuse, which is kept in a local history file and
//! filed as a task for the queue's owners. The change then lands locally.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use tracing::{info, instrument};

use crate::config::SubmitQueueConfig;
use crate::error::LandError;
use crate::prompt::{Prompter, ask_or_abort};
use crate::report::Reporter;
use crate::review::{ReviewClient, Revision, Task};

/// Scratch file the excuses are appended to.
pub const EXCUSE_HISTORY: &str = "tbr-excuses";

/// Title of the task filed for a bypass.
#[must_use]
pub fn task_title(revision: &Revision) -> String {
    format!("{} is skipping SubmitQueue", revision.monogram())
}

/// Description of the task filed for a bypass.
#[must_use]
pub fn task_description(revision: &Revision, author: &str, excuse: &str) -> String {
    format!(
        "{} is skipping SubmitQueue\n Author: {author}\n Excuse: {excuse}\n",
        revision.monogram()
    )
}

fn remember_excuse(scratch: &Path, excuse: &str) -> Result<(), LandError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(scratch.join(EXCUSE_HISTORY))?;
    writeln!(file, "{excuse}")?;
    Ok(())
}

/// Ask for an excuse and file the bypass task. Without configured tags
/// nothing is asked or filed and `Ok(None)` is returned.
///
/// # Errors
/// [`LandError::Aborted`] on an empty excuse, or review-server errors.
#[instrument(skip_all, fields(revision = revision.id))]
pub fn file_bypass(
    review: ReviewClient<'_>,
    config: &SubmitQueueConfig,
    revision: &Revision,
    author: &str,
    scratch: &Path,
    reporter: &dyn Reporter,
    prompter: &mut dyn Prompter,
) -> Result<Option<Task>, LandError> {
    if config.tags.is_empty() {
        return Ok(None);
    }
    let excuse = ask_or_abort(
        prompter,
        "Provide explanation for skipping SubmitQueue or press Enter to abort.",
    )?;
    let excuse = excuse.trim();
    if excuse.is_empty() {
        return Err(LandError::aborted("no explanation given for skipping SubmitQueue"));
    }
    remember_excuse(scratch, excuse)?;

    let projects = review.project_phids(&config.tags)?;
    let ccs = if config.owners.is_empty() {
        Vec::new()
    } else {
        review.user_phids(&config.owners)?
    };
    let task = review.create_task(
        &task_title(revision),
        &task_description(revision, author, excuse),
        &projects,
        &ccs,
    )?;
    info!(task = %task.object_name, "bypass task filed");
    reporter.info("TBR", &format!("Filed {} {}", task.object_name, task.uri));
    Ok(Some(task))
}
