//! Review-server access.
//!
//! [`Conduit`] is the raw call-by-name seam (`method`, JSON params → JSON
//! result). [`ReviewClient`] wraps it with the typed calls the land workflow
//! needs. [`HttpConduit`] is the production transport.

mod http;
pub mod types;

use std::collections::HashMap;
use std::fmt;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

pub use http::HttpConduit;
pub use types::{Build, Buildable, ChangedPath, Revision, RevisionStatus, Task, User};

// ---------------------------------------------------------------------------
// Conduit
// ---------------------------------------------------------------------------

/// Errors from a single Conduit call.
#[derive(Debug, Error)]
pub enum ConduitError {
    /// The request did not complete.
    #[error("request to `{method}` failed: {source}")]
    Transport {
        /// Method name.
        method: String,
        /// HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an error code.
    #[error("`{method}` returned {code}: {info}")]
    Remote {
        /// Method name.
        method: String,
        /// Server error code, e.g. `ERR-INVALID-AUTH`.
        code: String,
        /// Server error description.
        info: String,
    },

    /// The body was not a JSON envelope.
    #[error("`{method}` returned a body that is not JSON: {source}")]
    InvalidBody {
        /// Method name.
        method: String,
        /// Body decoding error.
        #[source]
        source: reqwest::Error,
    },

    /// The answer did not have the expected shape.
    #[error("`{method}` returned an unexpected response: {message}")]
    Decode {
        /// Method name.
        method: String,
        /// What was wrong.
        message: String,
    },
}

impl ConduitError {
    /// The method that failed.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Transport { method, .. }
            | Self::Remote { method, .. }
            | Self::InvalidBody { method, .. }
            | Self::Decode { method, .. } => method,
        }
    }

    fn decode(method: &str, message: impl fmt::Display) -> Self {
        Self::Decode {
            method: method.to_owned(),
            message: message.to_string(),
        }
    }
}

/// Synchronous call-by-name access to the review server.
pub trait Conduit {
    /// Call `method` with `params` and return the `result` member.
    ///
    /// # Errors
    /// Returns [`ConduitError`] on transport, server, or decoding failures.
    fn call(&self, method: &str, params: Value) -> Result<Value, ConduitError>;
}

// ---------------------------------------------------------------------------
// ReviewClient
// ---------------------------------------------------------------------------

/// Typed review-server calls.
#[derive(Clone, Copy)]
pub struct ReviewClient<'a> {
    conduit: &'a dyn Conduit,
}

impl<'a> ReviewClient<'a> {
    /// Wrap a [`Conduit`].
    #[must_use]
    pub fn new(conduit: &'a dyn Conduit) -> Self {
        Self { conduit }
    }

    fn revisions(&self, method: &str, result: Value) -> Result<Vec<Revision>, ConduitError> {
        let Value::Array(items) = result else {
            return Err(ConduitError::decode(method, "expected a list of revisions"));
        };
        items
            .into_iter()
            .map(|item| Revision::from_value(item).map_err(|e| ConduitError::decode(method, e)))
            .collect()
    }

    /// `user.whoami`.
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn whoami(&self) -> Result<User, ConduitError> {
        let result = self.conduit.call("user.whoami", json!({}))?;
        serde_json::from_value(result).map_err(|e| ConduitError::decode("user.whoami", e))
    }

    /// `differential.query` by revision ids.
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn revisions_by_id(&self, ids: &[u64]) -> Result<Vec<Revision>, ConduitError> {
        let result = self
            .conduit
            .call("differential.query", json!({ "ids": ids }))?;
        self.revisions("differential.query", result)
    }

    /// `differential.query` by commit hashes. `tag` is `gtcm` for git commits
    /// and `hgcm` for Mercurial ones.
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn revisions_by_commit(
        &self,
        tag: &str,
        hashes: &[String],
    ) -> Result<Vec<Revision>, ConduitError> {
        let pairs: Vec<[&str; 2]> = hashes.iter().map(|h| [tag, h.as_str()]).collect();
        let result = self
            .conduit
            .call("differential.query", json!({ "commitHashes": pairs }))?;
        self.revisions("differential.query", result)
    }

    /// Open revisions among `phids`.
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn open_revisions(&self, phids: &[String]) -> Result<Vec<Revision>, ConduitError> {
        let result = self.conduit.call(
            "differential.query",
            json!({ "phids": phids, "status": "status-open" }),
        )?;
        self.revisions("differential.query", result)
    }

    /// Map user object ids to login names (`user.query`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn user_names(&self, phids: &[String]) -> Result<HashMap<String, String>, ConduitError> {
        let result = self.conduit.call("user.query", json!({ "phids": phids }))?;
        let users: Vec<User> =
            serde_json::from_value(result).map_err(|e| ConduitError::decode("user.query", e))?;
        Ok(users.into_iter().map(|u| (u.phid, u.user_name)).collect())
    }

    /// Object ids for login names (`user.query`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn user_phids(&self, names: &[String]) -> Result<Vec<String>, ConduitError> {
        let result = self
            .conduit
            .call("user.query", json!({ "usernames": names }))?;
        let users: Vec<User> =
            serde_json::from_value(result).map_err(|e| ConduitError::decode("user.query", e))?;
        Ok(users.into_iter().map(|u| u.phid).collect())
    }

    /// Object ids for project names (`project.query`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn project_phids(&self, names: &[String]) -> Result<Vec<String>, ConduitError> {
        let result = self
            .conduit
            .call("project.query", json!({ "names": names }))?;
        let data = result
            .get("data")
            .and_then(Value::as_object)
            .ok_or_else(|| ConduitError::decode("project.query", "missing `data`"))?;
        Ok(data.keys().cloned().collect())
    }

    /// The canonical commit message (`differential.getcommitmessage`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn commit_message(&self, revision_id: u64) -> Result<String, ConduitError> {
        let result = self.conduit.call(
            "differential.getcommitmessage",
            json!({ "revision_id": revision_id }),
        )?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ConduitError::decode("differential.getcommitmessage", "not a string"))
    }

    /// The raw unified diff of one diff (`differential.getrawdiff`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn raw_diff(&self, diff_id: u64) -> Result<String, ConduitError> {
        let result = self
            .conduit
            .call("differential.getrawdiff", json!({ "diffID": diff_id }))?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ConduitError::decode("differential.getrawdiff", "not a string"))
    }

    /// Paths touched by one diff (`differential.querydiffs`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn changed_paths(&self, diff_id: u64) -> Result<Vec<ChangedPath>, ConduitError> {
        let result = self
            .conduit
            .call("differential.querydiffs", json!({ "ids": [diff_id] }))?;
        let diff = result
            .get(diff_id.to_string())
            .or_else(|| result.as_object().and_then(|m| m.values().next()))
            .ok_or_else(|| ConduitError::decode("differential.querydiffs", "no such diff"))?;
        let changes = diff.get("changes").cloned().unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(changes)
            .map_err(|e| ConduitError::decode("differential.querydiffs", e))
    }

    /// Buildables of a diff (`harbormaster.querybuildables`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn buildables(&self, diff_phid: &str) -> Result<Vec<Buildable>, ConduitError> {
        let result = self.conduit.call(
            "harbormaster.querybuildables",
            json!({ "buildablePHIDs": [diff_phid], "manualBuildables": false }),
        )?;
        let data = result.get("data").cloned().unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(data)
            .map_err(|e| ConduitError::decode("harbormaster.querybuildables", e))
    }

    /// Builds of a buildable (`harbormaster.querybuilds`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn builds(&self, buildable_phid: &str) -> Result<Vec<Build>, ConduitError> {
        let result = self.conduit.call(
            "harbormaster.querybuilds",
            json!({ "buildablePHIDs": [buildable_phid] }),
        )?;
        let Some(Value::Array(items)) = result.get("data").cloned() else {
            return Ok(Vec::new());
        };
        items
            .into_iter()
            .map(|item| {
                Build::from_value(item)
                    .map_err(|e| ConduitError::decode("harbormaster.querybuilds", e))
            })
            .collect()
    }

    /// Mark a landed revision closed (`differential.close`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn close_revision(&self, revision_id: u64) -> Result<(), ConduitError> {
        self.conduit
            .call("differential.close", json!({ "revisionID": revision_id }))?;
        Ok(())
    }

    /// Ask the server to import new commits soon (`diffusion.looksoon`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn request_repository_update(&self, repository_phid: &str) -> Result<(), ConduitError> {
        self.conduit
            .call("diffusion.looksoon", json!({ "repositories": [repository_phid] }))?;
        Ok(())
    }

    /// File a task (`maniphest.createtask`).
    ///
    /// # Errors
    /// Returns [`ConduitError`] on failure.
    pub fn create_task(
        &self,
        title: &str,
        description: &str,
        projects: &[String],
        ccs: &[String],
    ) -> Result<Task, ConduitError> {
        let result = self.conduit.call(
            "maniphest.createtask",
            json!({
                "title": title,
                "description": description,
                "projectPHIDs": projects,
                "ccPHIDs": ccs,
            }),
        )?;
        debug!(?result, "task created");
        serde_json::from_value(result).map_err(|e| ConduitError::decode("maniphest.createtask", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConduit;

    #[test]
    fn commit_hashes_are_tagged_pairs() {
        let conduit = FakeConduit::new();
        conduit.respond("differential.query", json!([]));
        let client = ReviewClient::new(&conduit);
        client
            .revisions_by_commit("gtcm", &["abc".to_owned()])
            .unwrap();
        let calls = conduit.calls();
        assert_eq!(calls[0].1, json!({ "commitHashes": [["gtcm", "abc"]] }));
    }

    #[test]
    fn querydiffs_result_is_keyed_by_id() {
        let conduit = FakeConduit::new();
        conduit.respond(
            "differential.querydiffs",
            json!({ "7": { "changes": [{ "oldPath": "a.rs", "currentPath": "b.rs" }] } }),
        );
        let paths = ReviewClient::new(&conduit).changed_paths(7).unwrap();
        assert_eq!(paths[0].current_path.as_deref(), Some("b.rs"));
    }

    #[test]
    fn remote_error_names_method() {
        let conduit = FakeConduit::new();
        conduit.fail("user.whoami", "ERR-INVALID-AUTH", "bad token");
        let err = ReviewClient::new(&conduit).whoami().unwrap_err();
        assert_eq!(err.method(), "user.whoami");
        assert!(err.to_string().contains("ERR-INVALID-AUTH"));
    }

    #[test]
    fn non_list_revision_result_is_a_decode_error() {
        let conduit = FakeConduit::new();
        conduit.respond("differential.query", json!({"oops": true}));
        let err = ReviewClient::new(&conduit).revisions_by_id(&[1]).unwrap_err();
        assert!(matches!(err, ConduitError::Decode { .. }));
    }
}
