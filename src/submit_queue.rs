//! Submit-queue client.
//!
//! The queue merges server-side. A land request is one JSON POST; the
//! answer carries the URL where the merge request can be tracked. A `409`
//! means the same request is already queued and its body carries that
//! request's URL, so it is handled exactly like a fresh acceptance.

use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Anti-hijacking prefix the queue may put in front of JSON bodies.
const SHIELD: &str = "for(;;);";

/// Status the queue answers with for a request it already holds.
const DUPLICATE_STATUS: u16 = 409;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Submit-queue failures.
#[derive(Debug, Error)]
pub enum SubmitQueueError {
    /// The request did not complete.
    #[error("could not reach the submit queue: {0}")]
    Transport(#[from] reqwest::Error),

    /// An error status other than the duplicate-request status.
    #[error("submit queue answered HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The body was not JSON after the shield prefix was removed.
    #[error("invalid JSON data in response to a merge request: {source}")]
    InvalidJson {
        /// Response body, shield removed.
        body: String,
        /// The decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The body was JSON but had no `url`.
    #[error("submit queue response has no `url`: {body}")]
    MissingUrl {
        /// Response body, shield removed.
        body: String,
    },

    /// The background submission thread died.
    #[error("submit queue request thread panicked")]
    Worker,
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A land request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmitRequest {
    /// Revision id.
    pub revision_id: u64,
    /// Diff id of the revision's latest diff.
    pub diff_id: u64,
    /// Remote the target lives on.
    pub remote: String,
    /// Source branch.
    pub source_ref: String,
    /// Target branch.
    pub target_ref: String,
    /// Staging ref holding the diff.
    pub diff_ref: String,
    /// Staging ref holding the commit the diff applies to.
    pub base_ref: String,
    /// Compare only; never publish.
    pub shadow: bool,
}

/// Names of the staging refs a diff is published under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefProvider {
    prefix: String,
    custom: bool,
}

impl RefProvider {
    /// `custom` selects `refs/<prefix>/...` over `refs/tags/<prefix>/...`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, custom: bool) -> Self {
        Self {
            prefix: prefix.into(),
            custom,
        }
    }

    fn root(&self) -> String {
        if self.custom {
            format!("refs/{}", self.prefix)
        } else {
            format!("refs/tags/{}", self.prefix)
        }
    }

    /// Ref holding the diff itself.
    #[must_use]
    pub fn diff_ref(&self, diff_id: u64) -> String {
        format!("{}/diff/{diff_id}", self.root())
    }

    /// Ref holding the diff's base commit.
    #[must_use]
    pub fn base_ref(&self, diff_id: u64) -> String {
        format!("{}/base/{diff_id}", self.root())
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Turn a queue response into the tracking URL.
///
/// # Errors
/// Any error status except `409` is [`SubmitQueueError::Status`]. A body that
/// is not JSON once the shield is removed is
/// [`SubmitQueueError::InvalidJson`].
pub fn interpret_response(status: u16, body: &str) -> Result<String, SubmitQueueError> {
    let is_error = status >= 400;
    if is_error && status != DUPLICATE_STATUS {
        return Err(SubmitQueueError::Status {
            status,
            body: body.to_owned(),
        });
    }
    if status == DUPLICATE_STATUS {
        debug!("submit queue already holds this request");
    }

    let raw = body.strip_prefix(SHIELD).unwrap_or(body);
    let data: Value = serde_json::from_str(raw).map_err(|source| SubmitQueueError::InvalidJson {
        body: raw.to_owned(),
        source,
    })?;
    data.get("url")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| SubmitQueueError::MissingUrl {
            body: raw.to_owned(),
        })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Blocking submit-queue client.
#[derive(Clone)]
pub struct SubmitQueueClient {
    endpoint: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl SubmitQueueClient {
    /// Client for the queue at `uri`, authenticating with the review token.
    ///
    /// # Errors
    /// Returns the HTTP client builder error.
    pub fn new(uri: &str, token: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint: format!("{}/merge_requests", uri.trim_end_matches('/')),
            token,
            client,
        })
    }

    /// Submit and wait for the tracking URL.
    ///
    /// # Errors
    /// See [`interpret_response`]; transport failures are
    /// [`SubmitQueueError::Transport`].
    #[instrument(skip(self), fields(revision = request.revision_id, shadow = request.shadow))]
    pub fn submit(&self, request: &SubmitRequest) -> Result<String, SubmitQueueError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        interpret_response(status, &body)
    }

    /// Submit on a background thread; resolve the result later.
    #[must_use]
    pub fn start(&self, request: SubmitRequest) -> PendingSubmission {
        let client = self.clone();
        PendingSubmission {
            handle: std::thread::spawn(move || client.submit(&request)),
        }
    }
}

/// A submission started with [`SubmitQueueClient::start`].
pub struct PendingSubmission {
    handle: JoinHandle<Result<String, SubmitQueueError>>,
}

impl PendingSubmission {
    /// Wait for the submission to finish.
    ///
    /// # Errors
    /// Returns the submission error, or [`SubmitQueueError::Worker`] if the
    /// thread panicked.
    pub fn resolve(self) -> Result<String, SubmitQueueError> {
        self.handle.join().unwrap_or_else(|_| {
            warn!("submit queue thread panicked");
            Err(SubmitQueueError::Worker)
        })
    }
}
