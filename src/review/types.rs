//! Review-server records, decoded from Conduit responses.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// An id the server may send either as a JSON number or a string.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Int(u64),
    Str(String),
}

impl WireId {
    fn value(&self) -> Option<u64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    fn text(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Str(s) => s.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// RevisionStatus
// ---------------------------------------------------------------------------

/// Review state of a revision.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RevisionStatus {
    /// Waiting on reviewers.
    NeedsReview,
    /// Reviewers requested changes.
    NeedsRevision,
    /// Approved for landing.
    Accepted,
    /// Already landed.
    Closed,
    /// Withdrawn by the author.
    Abandoned,
    /// The author plans further changes.
    ChangesPlanned,
    /// Not yet sent for review.
    Draft,
    /// A status this client does not know.
    Unknown(String),
}

impl RevisionStatus {
    /// Decode the numeric status code `differential.query` returns.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => Self::NeedsReview,
            "1" => Self::NeedsRevision,
            "2" => Self::Accepted,
            "3" => Self::Closed,
            "4" => Self::Abandoned,
            "5" => Self::ChangesPlanned,
            "6" => Self::Draft,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeedsReview => write!(f, "Needs Review"),
            Self::NeedsRevision => write!(f, "Needs Revision"),
            Self::Accepted => write!(f, "Accepted"),
            Self::Closed => write!(f, "Closed"),
            Self::Abandoned => write!(f, "Abandoned"),
            Self::ChangesPlanned => write!(f, "Changes Planned"),
            Self::Draft => write!(f, "Draft"),
            Self::Unknown(code) => write!(f, "Unknown ({code})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WireRevision {
    id: WireId,
    phid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    uri: String,
    status: WireId,
    #[serde(rename = "authorPHID", default)]
    author_phid: String,
    #[serde(rename = "activeDiffPHID", default)]
    active_diff_phid: Option<String>,
    #[serde(default)]
    diffs: Vec<WireId>,
    #[serde(default)]
    auxiliary: Value,
    #[serde(rename = "repositoryPHID", default)]
    repository_phid: Option<String>,
}

/// A review-server revision, as loaded for one land attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    /// Numeric id (the `N` in `DN`).
    pub id: u64,
    /// Server object id.
    pub phid: String,
    /// Title.
    pub title: String,
    /// Web URI.
    pub uri: String,
    /// Review state.
    pub status: RevisionStatus,
    /// Author's object id.
    pub author_phid: String,
    /// Object id of the diff currently under review.
    pub active_diff_phid: Option<String>,
    /// Diff ids, newest first.
    pub diffs: Vec<u64>,
    /// Object ids of revisions this one depends on.
    pub depends_on: Vec<String>,
    /// Object id of the repository the revision belongs to.
    pub repository_phid: Option<String>,
}

impl Revision {
    /// Decode one element of a `differential.query` result.
    ///
    /// # Errors
    /// Returns the decoder error when required fields are missing.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let wire: WireRevision = serde_json::from_value(value)?;
        let depends_on = wire
            .auxiliary
            .get("phabricator:depends-on")
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            id: wire.id.value().unwrap_or_default(),
            phid: wire.phid,
            title: wire.title,
            uri: wire.uri,
            status: RevisionStatus::from_code(&wire.status.text()),
            author_phid: wire.author_phid,
            active_diff_phid: wire.active_diff_phid.filter(|p| !p.is_empty()),
            diffs: wire.diffs.iter().filter_map(WireId::value).collect(),
            depends_on,
            repository_phid: wire.repository_phid.filter(|p| !p.is_empty()),
        })
    }

    /// `D<id>`.
    #[must_use]
    pub fn monogram(&self) -> String {
        format!("D{}", self.id)
    }

    /// `D<id>: <title>`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("D{}: {}", self.id, self.title)
    }

    /// The most recent diff id.
    #[must_use]
    pub fn latest_diff(&self) -> Option<u64> {
        self.diffs.iter().copied().max()
    }
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

/// Aggregate CI status of a diff.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Buildable {
    /// Object id.
    pub phid: String,
    /// `passed`, `building`, `failed`, or another server-defined status.
    #[serde(rename = "buildableStatus", default)]
    pub status: String,
    /// Web URI.
    #[serde(default)]
    pub uri: String,
}

/// One CI build belonging to a buildable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Build {
    /// Build id.
    pub id: u64,
    /// Build plan name.
    pub name: String,
    /// Machine status, e.g. `failed`.
    pub status: String,
    /// Display status, e.g. `Failed`.
    pub status_name: String,
}

#[derive(Deserialize)]
struct WireBuild {
    id: WireId,
    #[serde(default)]
    name: String,
    #[serde(rename = "buildStatus", default)]
    status: String,
    #[serde(rename = "buildStatusName", default)]
    status_name: String,
}

impl Build {
    /// Decode one element of a `harbormaster.querybuilds` result.
    ///
    /// # Errors
    /// Returns the decoder error when the id is missing.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let wire: WireBuild = serde_json::from_value(value)?;
        Ok(Self {
            id: wire.id.value().unwrap_or_default(),
            name: wire.name,
            status: wire.status,
            status_name: wire.status_name,
        })
    }
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

/// The authenticated user.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct User {
    /// Object id.
    pub phid: String,
    /// Login name.
    #[serde(rename = "userName")]
    pub user_name: String,
}

/// Paths touched by one file change in a diff.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChangedPath {
    /// Path before the change.
    #[serde(rename = "oldPath", default)]
    pub old_path: Option<String>,
    /// Path after the change.
    #[serde(rename = "currentPath", default)]
    pub current_path: Option<String>,
}

/// A task created when the queue is bypassed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Task {
    /// `T<id>`.
    #[serde(rename = "objectName", default)]
    pub object_name: String,
    /// Web URI.
    #[serde(default)]
    pub uri: String,
}
