//! Where a land goes: the target branch and the remote it is published to.
//!
//! Each is taken from the first source that names one, in order: the
//! command-line flag, the source branch's upstream tracking chain, the
//! repository config (target only), and the backend default. The result is
//! computed once per land and never re-derived.

use std::fmt;

use arcland_vcs::{Backend, RefKind, RepositoryApi, UpstreamPath};
use tracing::{info, instrument};

use crate::error::LandError;
use crate::report::Reporter;

/// What picked the target branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OntoSource {
    /// `--onto`.
    Flag,
    /// The source branch's upstream chain.
    Upstream,
    /// `[land].onto_default`.
    Config,
    /// The backend's default.
    Default,
}

/// What picked the remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteSource {
    /// `--remote`.
    Flag,
    /// The source branch's upstream chain.
    Upstream,
    /// The backend's default.
    Default,
}

/// The resolved destination of a land.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LandTarget {
    /// Target branch or bookmark.
    pub onto: String,
    /// Whether `onto` is a branch or a bookmark.
    pub onto_kind: RefKind,
    /// Remote to publish to. Empty means the backend's default path.
    pub remote: String,
    /// `onto` as last seen on the remote, e.g. `origin/master`.
    pub remote_branch: String,
    /// What picked `onto`.
    pub onto_source: OntoSource,
    /// What picked `remote`.
    pub remote_source: RemoteSource,
}

impl fmt::Display for LandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.remote_branch)
    }
}

/// Explicit inputs to target resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct TargetRequest<'a> {
    /// `--onto`.
    pub onto: Option<&'a str>,
    /// `--remote`.
    pub remote: Option<&'a str>,
    /// `[land].onto_default`.
    pub config_onto: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Choice
// ---------------------------------------------------------------------------

/// A note to show the operator about how a choice was made.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Note {
    Info(&'static str, String),
    Warn(&'static str, String),
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn has_upstream(path: &UpstreamPath) -> bool {
    path.hops.len() > 1 || path.remote.is_some() || path.cycle.is_some()
}

fn choose_onto(
    request: &TargetRequest<'_>,
    path: &UpstreamPath,
    backend: Backend,
    notes: &mut Vec<Note>,
) -> (String, OntoSource) {
    if let Some(onto) = non_empty(request.onto) {
        notes.push(Note::Info(
            "TARGET",
            format!("Landing onto \"{onto}\", selected by the --onto flag."),
        ));
        return (onto.to_owned(), OntoSource::Flag);
    }

    if has_upstream(path) {
        if let Some(cycle) = &path.cycle {
            notes.push(Note::Warn(
                "LOCAL CYCLE",
                "Local branch tracks an upstream, but following it leads to a local cycle; \
                 ignoring branch upstream."
                    .to_owned(),
            ));
            notes.push(Note::Warn("", format!("    {}", cycle.join(" -> "))));
        } else if let Some(remote) = &path.remote {
            notes.push(Note::Info(
                "TARGET",
                format!(
                    "Landing onto \"{}\", selected by following tracking branches upstream \
                     to the closest remote.",
                    remote.branch
                ),
            ));
            return (remote.branch.clone(), OntoSource::Upstream);
        } else {
            notes.push(Note::Info(
                "NO PATH TO UPSTREAM",
                "Local branch tracks an upstream, but there is no path to a remote; \
                 ignoring branch upstream."
                    .to_owned(),
            ));
        }
    }

    if let Some(onto) = non_empty(request.config_onto) {
        notes.push(Note::Info(
            "TARGET",
            format!("Landing onto \"{onto}\", selected by \"land.onto_default\" configuration."),
        ));
        return (onto.to_owned(), OntoSource::Config);
    }

    let onto = backend.default_onto();
    notes.push(Note::Info(
        "TARGET",
        format!("Landing onto \"{onto}\", the default target under {backend}."),
    ));
    (onto.to_owned(), OntoSource::Default)
}

fn choose_remote(
    request: &TargetRequest<'_>,
    path: &UpstreamPath,
    backend: Backend,
    notes: &mut Vec<Note>,
) -> (String, RemoteSource) {
    if let Some(remote) = non_empty(request.remote) {
        notes.push(Note::Info(
            "REMOTE",
            format!("Using remote \"{remote}\", selected by the --remote flag."),
        ));
        return (remote.to_owned(), RemoteSource::Flag);
    }

    if let Some(upstream) = path.remote.as_ref().filter(|_| !path.is_cycle()) {
        notes.push(Note::Info(
            "REMOTE",
            format!(
                "Using remote \"{}\", selected by following tracking branches upstream to \
                 the closest remote.",
                upstream.remote
            ),
        ));
        return (upstream.remote.clone(), RemoteSource::Upstream);
    }

    let remote = backend.default_remote();
    if !remote.is_empty() {
        notes.push(Note::Info(
            "REMOTE",
            format!("Using remote \"{remote}\", the default remote under {backend}."),
        ));
    }
    (remote.to_owned(), RemoteSource::Default)
}

// ---------------------------------------------------------------------------
// TargetResolver
// ---------------------------------------------------------------------------

/// Resolves a [`LandTarget`] for a source branch.
pub struct TargetResolver<'a> {
    repo: &'a dyn RepositoryApi,
    reporter: &'a dyn Reporter,
}

impl<'a> TargetResolver<'a> {
    /// Resolver over `repo`, explaining its choices through `reporter`.
    #[must_use]
    pub fn new(repo: &'a dyn RepositoryApi, reporter: &'a dyn Reporter) -> Self {
        Self { repo, reporter }
    }

    /// Resolve the target of landing `source`.
    ///
    /// # Errors
    /// Returns an error if the upstream chain or the target kind cannot be
    /// queried.
    #[instrument(skip(self, request))]
    pub fn resolve(
        &self,
        source: &str,
        request: &TargetRequest<'_>,
    ) -> Result<LandTarget, LandError> {
        let backend = self.repo.backend();
        let path = self.repo.upstream_path(source)?;

        let mut notes = Vec::new();
        let (onto, onto_source) = choose_onto(request, &path, backend, &mut notes);
        let (remote, remote_source) = choose_remote(request, &path, backend, &mut notes);
        for note in &notes {
            match note {
                Note::Info(tag, message) => self.reporter.info(tag, message),
                Note::Warn("", message) => self.reporter.line(message),
                Note::Warn(tag, message) => self.reporter.warn(tag, message),
            }
        }

        let onto_kind = self.repo.ref_kind(&onto)?;
        let remote_branch = self.repo.remote_tracking_ref(&remote, &onto);
        info!(%onto, %remote, %remote_branch, ?onto_source, ?remote_source, "target resolved");
        Ok(LandTarget {
            onto,
            onto_kind,
            remote,
            remote_branch,
            onto_source,
            remote_source,
        })
    }
}
