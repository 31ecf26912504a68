//! git backend, driving the `git` CLI.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::VcsError;
use crate::exec::{self, CommandOutput, Runner, SystemRunner};
use crate::repo::RepositoryApi;
use crate::types::{
    Backend, Capabilities, CommitSummary, Fork, LogEntry, RefKind, RemoteBranch, Snapshot,
    SquashOutcome, UpstreamPath, WorkingCopyState,
};

/// A git working copy.
pub struct GitRepository {
    root: PathBuf,
    git_dir: PathBuf,
    runner: Box<dyn Runner>,
    caps: Capabilities,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("root", &self.root)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

impl GitRepository {
    /// Open the git working copy containing `path`.
    ///
    /// # Errors
    /// Returns an error if `path` is not inside a git working copy.
    pub fn open(path: &Path) -> Result<Self, VcsError> {
        Self::with_runner(path, Box::new(SystemRunner))
    }

    /// Open with an explicit [`Runner`].
    ///
    /// # Errors
    /// Returns an error if `path` is not inside a git working copy.
    pub fn with_runner(path: &Path, runner: Box<dyn Runner>) -> Result<Self, VcsError> {
        let top = exec::check(
            "git",
            &["rev-parse", "--show-toplevel"],
            runner.run("git", &["rev-parse", "--show-toplevel"], path)?,
        )?;
        let root = PathBuf::from(top.stdout.trim());
        let dir = exec::check(
            "git",
            &["rev-parse", "--absolute-git-dir"],
            runner.run("git", &["rev-parse", "--absolute-git-dir"], &root)?,
        )?;
        let git_dir = PathBuf::from(dir.stdout.trim());

        let svn = runner.run("git", &["config", "--get-regexp", "^svn-remote\\."], &root)?;
        let caps = Capabilities {
            rebase: true,
            phases: false,
            bookmarks: false,
            subversion: svn.success() && !svn.stdout.trim().is_empty(),
        };
        Ok(Self {
            root,
            git_dir,
            runner,
            caps,
        })
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, VcsError> {
        self.runner.run("git", args, &self.root)
    }

    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let out = exec::check("git", args, self.run(args)?)?;
        Ok(out.stdout)
    }

    fn config_value(&self, key: &str) -> Result<Option<String>, VcsError> {
        let out = self.run(&["config", "--get", key])?;
        if out.success() {
            let value = out.stdout.trim();
            Ok((!value.is_empty()).then(|| value.to_owned()))
        } else {
            Ok(None)
        }
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, VcsError> {
        let args = ["merge-base", "--is-ancestor", ancestor, descendant];
        let out = self.run(&args)?;
        match out.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(VcsError::CommandFailed {
                command: exec::display_command("git", &args),
                code,
                stdout: out.stdout,
                stderr: out.stderr,
            }),
        }
    }

    fn require(&self, spec: &str) -> Result<String, VcsError> {
        self.resolve(spec)?.ok_or_else(|| VcsError::NotFound {
            message: format!("revision `{spec}`"),
        })
    }

    fn local_branches(&self) -> Result<BTreeMap<String, String>, VcsError> {
        let out = self.git(&[
            "for-each-ref",
            "--format=%(refname:short) %(objectname)",
            "refs/heads/",
        ])?;
        Ok(out
            .lines()
            .filter_map(|line| line.split_once(' '))
            .map(|(name, sha)| (name.to_owned(), sha.to_owned()))
            .collect())
    }

    fn update_submodules(&self) -> Result<(), VcsError> {
        self.git(&["submodule", "update", "--init", "--recursive"])?;
        Ok(())
    }
}

/// Parse `git status --porcelain` into staged and unstaged paths.
fn parse_porcelain(out: &str) -> WorkingCopyState {
    let mut state = WorkingCopyState::default();
    for line in out.lines() {
        if line.len() < 4 {
            continue;
        }
        let (code, path) = line.split_at(3);
        let mut flags = code.chars();
        let index = flags.next().unwrap_or(' ');
        let worktree = flags.next().unwrap_or(' ');
        let path = path.to_owned();
        let unmerged = matches!((index, worktree), ('U', _) | (_, 'U') | ('A', 'A') | ('D', 'D'));
        if index == '?' || worktree != ' ' || unmerged {
            state.unstaged.push(path);
        } else {
            state.staged.push(path);
        }
    }
    state
}

/// Parse `--format=%H%x1f%B%x1e` log output.
fn parse_log_entries(out: &str) -> Vec<LogEntry> {
    out.split('\x1e')
        .filter_map(|record| {
            let record = record.trim_start_matches('\n');
            let (id, message) = record.split_once('\x1f')?;
            Some(LogEntry {
                id: id.trim().to_owned(),
                message: message.trim_end().to_owned(),
            })
        })
        .filter(|entry| !entry.id.is_empty())
        .collect()
}

fn parse_oneline(out: &str) -> Vec<CommitSummary> {
    out.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (id, summary) = line.split_once(' ').unwrap_or((line, ""));
            CommitSummary {
                id: id.to_owned(),
                summary: summary.to_owned(),
            }
        })
        .collect()
}

impl RepositoryApi for GitRepository {
    fn backend(&self) -> Backend {
        Backend::Git
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn scratch_dir(&self) -> Result<PathBuf, VcsError> {
        let dir = self.git_dir.join("arcland");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn push_command(&self) -> &'static str {
        if self.caps.subversion {
            "git svn dcommit"
        } else {
            "git push"
        }
    }

    fn current_ref(&self) -> Result<Option<String>, VcsError> {
        let out = self.run(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if out.success() {
            return Ok(Some(out.stdout.trim().to_owned()));
        }
        self.resolve("HEAD")
    }

    fn ref_kind(&self, _name: &str) -> Result<RefKind, VcsError> {
        Ok(RefKind::Branch)
    }

    fn resolve(&self, spec: &str) -> Result<Option<String>, VcsError> {
        let object = format!("{spec}^{{commit}}");
        let out = self.run(&["rev-parse", "--verify", "--quiet", &object])?;
        Ok(out
            .success()
            .then(|| out.stdout.trim().to_owned())
            .filter(|sha| !sha.is_empty()))
    }

    fn working_copy_state(&self) -> Result<WorkingCopyState, VcsError> {
        let out = self.git(&["status", "--porcelain", "--untracked-files=all"])?;
        Ok(parse_porcelain(&out))
    }

    #[instrument(skip(self))]
    fn upstream_path(&self, branch: &str) -> Result<UpstreamPath, VcsError> {
        let mut path = UpstreamPath::default();
        let mut current = branch.to_owned();
        loop {
            if let Some(pos) = path.hops.iter().position(|hop| *hop == current) {
                path.cycle = Some(path.hops[pos..].to_vec());
                break;
            }
            path.hops.push(current.clone());

            let remote = self.config_value(&format!("branch.{current}.remote"))?;
            let merge = self.config_value(&format!("branch.{current}.merge"))?;
            let (Some(remote), Some(merge)) = (remote, merge) else {
                break;
            };
            let name = merge
                .strip_prefix("refs/heads/")
                .unwrap_or(&merge)
                .to_owned();
            if remote == "." {
                current = name;
                continue;
            }
            path.remote = Some(RemoteBranch {
                remote,
                branch: name,
            });
            break;
        }
        debug!(hops = ?path.hops, remote = ?path.remote, cycle = path.is_cycle(), "upstream path");
        Ok(path)
    }

    fn remote_tracking_ref(&self, remote: &str, onto: &str) -> String {
        if self.caps.subversion {
            "trunk".to_owned()
        } else {
            format!("{remote}/{onto}")
        }
    }

    fn pending_commits(&self, source: &str, onto: &str) -> Result<Vec<CommitSummary>, VcsError> {
        let exclude = format!("^{onto}");
        let out = self.git(&["log", "--oneline", source, &exclude, "--"])?;
        Ok(parse_oneline(&out))
    }

    fn range_commits(&self, base: &str, head: &str) -> Result<Vec<LogEntry>, VcsError> {
        let range = format!("{base}..{head}");
        let out = self.git(&["log", "--format=%H%x1f%B%x1e", &range, "--"])?;
        Ok(parse_log_entries(&out))
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, VcsError> {
        let out = self.run(&["merge-base", a, b])?;
        Ok(out
            .success()
            .then(|| out.stdout.trim().to_owned())
            .filter(|sha| !sha.is_empty()))
    }

    fn full_diff(&self, base: &str, head: &str) -> Result<String, VcsError> {
        self.git(&[
            "diff",
            "--no-ext-diff",
            "--no-textconv",
            "--no-color",
            "--src-prefix=a/",
            "--dst-prefix=b/",
            "-M",
            "-C",
            "-U32767",
            base,
            head,
            "--",
        ])
    }

    fn forks(
        &self,
        source: &str,
        onto: &str,
        source_before: &str,
    ) -> Result<Vec<Fork>, VcsError> {
        let onto_commit = self.require(onto)?;
        let mut forks = Vec::new();
        for (name, tip) in self.local_branches()? {
            if name == source || name == onto || tip == source_before {
                continue;
            }
            if self.is_ancestor(&tip, source_before)? {
                continue;
            }
            let Some(base) = self.merge_base(&tip, source_before)? else {
                continue;
            };
            if base == source_before || self.is_ancestor(&base, &onto_commit)? {
                continue;
            }
            forks.push(Fork {
                name: Some(name),
                commit: tip,
                base: Some(base),
            });
        }
        Ok(forks)
    }

    fn fetch(&self, remote: &str, onto: &str) -> Result<(), VcsError> {
        if self.caps.subversion {
            self.git(&["svn", "fetch"])?;
        } else {
            self.git(&["fetch", "--quiet", remote, onto])?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn pull_target(&self, remote: &str, onto: &str) -> Result<(), VcsError> {
        self.checkout(onto)?;
        if self.caps.subversion {
            self.git(&["svn", "rebase"])?;
        } else {
            self.git(&["pull", "--ff-only", "--no-stat", remote, onto])?;
        }
        Ok(())
    }

    fn is_ahead_of_remote(&self, remote: &str, onto: &str) -> Result<bool, VcsError> {
        let range = format!("{}..{onto}", self.remote_tracking_ref(remote, onto));
        let out = self.git(&["log", "--oneline", &range, "--"])?;
        Ok(!out.trim().is_empty())
    }

    fn checkout(&self, name: &str) -> Result<(), VcsError> {
        self.git(&["checkout", "--quiet", name])?;
        Ok(())
    }

    fn return_to(&self, name: &str) -> Result<(), VcsError> {
        self.checkout(name)?;
        self.update_submodules()
    }

    fn rebase_source(&self, source: &str, onto: &str) -> Result<(), VcsError> {
        self.git(&["rebase", "--quiet", onto, source])?;
        Ok(())
    }

    fn merge_target_into_source(
        &self,
        source: &str,
        onto: &str,
        message: &str,
    ) -> Result<(), VcsError> {
        self.checkout(source)?;
        self.git(&["merge", "--no-stat", onto, "-m", message])?;
        Ok(())
    }

    fn abort_update(&self) -> Result<(), VcsError> {
        if self.git_dir.join("rebase-merge").exists() || self.git_dir.join("rebase-apply").exists()
        {
            self.git(&["rebase", "--abort"])?;
        }
        if self.git_dir.join("MERGE_HEAD").exists() {
            self.git(&["merge", "--abort"])?;
        }
        Ok(())
    }

    fn rebase_fork(&self, fork: &Fork, source: &str) -> Result<(), VcsError> {
        let name = fork.name.as_deref().ok_or_else(|| VcsError::NotFound {
            message: format!("branch name for fork at {}", fork.commit),
        })?;
        let base = fork.base.as_deref().ok_or_else(|| VcsError::NotFound {
            message: format!("fork point of {name}"),
        })?;
        self.git(&["rebase", "--quiet", "--onto", source, base, name])?;
        Ok(())
    }

    fn squash(
        &self,
        source: &str,
        onto: &str,
        _message_file: &Path,
    ) -> Result<SquashOutcome, VcsError> {
        self.checkout(onto)?;
        self.git(&["merge", "--no-stat", "--squash", "--ff-only", source])?;
        Ok(SquashOutcome::Staged)
    }

    fn merge_no_ff(&self, source: &str, onto: &str) -> Result<(), VcsError> {
        self.checkout(onto)?;
        self.git(&["merge", "--no-stat", "--no-ff", "--no-commit", source])?;
        Ok(())
    }

    fn commit(&self, message_file: &Path) -> Result<(), VcsError> {
        let file = message_file.to_string_lossy();
        self.git(&["commit", "--quiet", "-F", &file])?;
        Ok(())
    }

    fn reparent_children(
        &self,
        source: &str,
        source_commit: &str,
        onto: &str,
    ) -> Result<Vec<String>, VcsError> {
        let out = self.git(&[
            "for-each-ref",
            "--format=%(refname:short)",
            "--contains",
            source_commit,
            "refs/heads/",
        ])?;
        let children: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != source && *name != onto)
            .map(str::to_owned)
            .collect();
        for child in &children {
            self.git(&["rebase", "--quiet", "--onto", onto, source_commit, child])?;
        }
        if !children.is_empty() {
            self.checkout(onto)?;
        }
        Ok(children)
    }

    #[instrument(skip(self))]
    fn push(&self, remote: &str, onto: &str) -> Result<(), VcsError> {
        if self.caps.subversion {
            self.git(&["svn", "dcommit"])?;
        } else {
            self.git(&["push", remote, onto])?;
        }
        Ok(())
    }

    fn snapshot(
        &self,
        original_ref: &str,
        source: &str,
        onto: &str,
    ) -> Result<Snapshot, VcsError> {
        Ok(Snapshot {
            original_ref: original_ref.to_owned(),
            onto: onto.to_owned(),
            onto_commit: self.require(onto)?,
            source: source.to_owned(),
            source_commit: self.require(source)?,
            refs: self.local_branches()?,
            heads: Vec::new(),
            backup: None,
        })
    }

    #[instrument(skip(self, snapshot), fields(onto = %snapshot.onto, source = %snapshot.source))]
    fn restore(&self, snapshot: &Snapshot) -> Result<(), VcsError> {
        self.abort_update()?;
        self.git(&["reset", "--quiet", "--hard"])?;
        self.git(&["checkout", "--quiet", "--detach", &snapshot.onto_commit])?;

        let current = self.local_branches()?;
        for (name, commit) in &snapshot.refs {
            if current.get(name) != Some(commit) {
                debug!(branch = %name, commit = %commit, "resetting branch");
                let full = format!("refs/heads/{name}");
                self.git(&["update-ref", &full, commit])?;
            }
        }
        self.return_to(&snapshot.original_ref)
    }

    fn delete_source(&self, source: &str, _onto: &str) -> Result<Option<String>, VcsError> {
        let sha = self.resolve(source)?;
        self.git(&["branch", "-D", source])?;
        Ok(sha.map(|sha| format!("git checkout -b {source} {sha}")))
    }

    fn delete_remote_source(&self, remote: &str, source: &str) -> Result<bool, VcsError> {
        let tracking = format!("{remote}/{source}");
        if self.resolve(&tracking)?.is_none() {
            return Ok(false);
        }
        let refspec = format!(":{source}");
        self.git(&["push", remote, &refspec])?;
        Ok(true)
    }
}
