//! Shared fixtures for arcland integration tests.
//!
//! Every test runs against its own pair of temp directories: a bare remote
//! and a clone of it with `master` pushed. Nothing touches the real repo.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use arcland::testing::{FakeConduit, revision_json};
use arcland_vcs::RepositoryApi;
use serde_json::{Value, json};
use tempfile::TempDir;

/// Revision id every fixture commit message names.
pub const REVISION: u64 = 12;

/// Commit message the fake review server hands out for [`REVISION`].
pub const LANDED_MESSAGE: &str =
    "Land the widget\n\nDifferential Revision: https://review.example.com/D12\n";

/// Run git in `dir`, asserting success. Returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// Write `name`, stage it, and commit. Returns the new commit id.
pub fn commit_file(dir: &Path, name: &str, contents: &str, message: &str) -> String {
    std::fs::write(dir.join(name), contents).expect("failed to write file");
    git(dir, &["add", name]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

/// A bare remote and a working clone.
pub struct Fixture {
    pub remote: TempDir,
    pub work: TempDir,
}

impl Fixture {
    /// Remote with one commit on `master`, cloned and checked out.
    pub fn new() -> Self {
        let remote = TempDir::new().expect("failed to create remote dir");
        git(remote.path(), &["init", "-q", "--bare"]);
        git(remote.path(), &["symbolic-ref", "HEAD", "refs/heads/master"]);

        let work = TempDir::new().expect("failed to create work dir");
        let dir = work.path();
        git(dir, &["init", "-q"]);
        git(dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        git(dir, &["config", "user.email", "test@test.com"]);
        git(dir, &["config", "user.name", "Test User"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
        commit_file(dir, "README.md", "# widget\n", "initial commit");
        let url = remote.path().to_string_lossy().into_owned();
        git(dir, &["remote", "add", "origin", &url]);
        git(dir, &["push", "-q", "origin", "master"]);
        git(dir, &["fetch", "-q", "origin"]);

        Self { remote, work }
    }

    pub fn dir(&self) -> &Path {
        self.work.path()
    }

    pub fn repo(&self) -> Box<dyn RepositoryApi> {
        arcland_vcs::open(self.dir()).expect("failed to open fixture repo")
    }

    /// Create `name` off master with two commits naming [`REVISION`], and
    /// leave it checked out. Returns the tip.
    pub fn feature(&self, name: &str) -> String {
        let dir = self.dir();
        git(dir, &["checkout", "-q", "-b", name, "master"]);
        commit_file(dir, "widget.rs", "fn widget() {}\n", "Add widget");
        let message = format!("Wire widget\n\n{}", LANDED_MESSAGE.lines().last().unwrap_or_default());
        commit_file(dir, "main.rs", "fn main() { widget(); }\n", &message)
    }

    pub fn current_branch(&self) -> String {
        git(self.dir(), &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn rev(&self, spec: &str) -> String {
        git(self.dir(), &["rev-parse", spec])
    }

    pub fn has_branch(&self, name: &str) -> bool {
        !git(self.dir(), &["branch", "--list", name]).is_empty()
    }

    pub fn remote_rev(&self, spec: &str) -> String {
        git(self.remote.path(), &["rev-parse", spec])
    }

    /// Make the remote reject every push.
    pub fn reject_pushes(&self) {
        use std::os::unix::fs::PermissionsExt as _;

        let hook = self.remote.path().join("hooks").join("pre-receive");
        std::fs::create_dir_all(hook.parent().expect("hook has a parent"))
            .expect("failed to create hooks dir");
        std::fs::write(&hook, "#!/bin/sh\necho 'pushes are frozen' >&2\nexit 1\n")
            .expect("failed to write hook");
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755))
            .expect("failed to chmod hook");
    }
}

/// A review server that knows accepted revision [`REVISION`], authored by
/// the operator, with no builds.
pub fn review_server() -> FakeConduit {
    review_server_with(revision_json(REVISION, "Land the widget"))
}

/// [`review_server`] serving `revision` instead.
pub fn review_server_with(revision: Value) -> FakeConduit {
    let conduit = FakeConduit::new();
    conduit.respond("differential.query", json!([revision]));
    conduit.respond(
        "user.whoami",
        json!({ "phid": "PHID-USER-me", "userName": "me" }),
    );
    conduit.respond("differential.getcommitmessage", json!(LANDED_MESSAGE));
    conduit.respond("harbormaster.querybuildables", json!({ "data": [] }));
    conduit.respond("diffusion.looksoon", json!(null));
    conduit.respond("differential.close", json!(null));
    conduit
}
