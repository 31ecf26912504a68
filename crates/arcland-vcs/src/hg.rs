//! Mercurial backend, driving the `hg` CLI.
//!
//! Revsets are built with [`sym`] so branch and bookmark names are always
//! quoted as symbols.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::error::VcsError;
use crate::exec::{self, CommandOutput, Runner, SystemRunner};
use crate::repo::RepositoryApi;
use crate::types::{
    Backend, Capabilities, CommitSummary, Fork, LogEntry, RefKind, Snapshot, SquashOutcome,
    UpstreamPath, WorkingCopyState,
};

const STRIP: [&str; 3] = ["--config", "extensions.strip=", "strip"];

/// A Mercurial working copy.
pub struct HgRepository {
    root: PathBuf,
    runner: Box<dyn Runner>,
    caps: Capabilities,
}

impl std::fmt::Debug for HgRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HgRepository")
            .field("root", &self.root)
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

/// Quote a name as a revset symbol.
fn sym(name: &str) -> String {
    format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

impl HgRepository {
    /// Open the Mercurial working copy containing `path`.
    ///
    /// # Errors
    /// Returns an error if `path` is not inside a Mercurial working copy.
    pub fn open(path: &Path) -> Result<Self, VcsError> {
        Self::with_runner(path, Box::new(SystemRunner))
    }

    /// Open with an explicit [`Runner`].
    ///
    /// # Errors
    /// Returns an error if `path` is not inside a Mercurial working copy.
    pub fn with_runner(path: &Path, runner: Box<dyn Runner>) -> Result<Self, VcsError> {
        let top = exec::check("hg", &["root"], runner.run("hg", &["root"], path)?)?;
        let root = PathBuf::from(top.stdout.trim());
        let rebase = runner.run("hg", &["config", "extensions.rebase"], &root)?;
        let phases = runner.run("hg", &["log", "-r", ".", "-T", "{phase}"], &root)?;
        let caps = Capabilities {
            rebase: rebase.success(),
            phases: phases.success() && !phases.stdout.trim().is_empty(),
            bookmarks: true,
            subversion: root.join(".hg").join("svn").is_dir(),
        };
        debug!(?caps, "hg capabilities");
        Ok(Self { root, runner, caps })
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, VcsError> {
        self.runner.run("hg", args, &self.root)
    }

    fn hg(&self, args: &[&str]) -> Result<String, VcsError> {
        let out = exec::check("hg", args, self.run(args)?)?;
        Ok(out.stdout)
    }

    fn log_nodes(&self, revset: &str) -> Result<Vec<String>, VcsError> {
        Ok(lines(&self.hg(&["log", "-r", revset, "-T", "{node}\\n"])?))
    }

    fn first_node(&self, revset: &str) -> Result<Option<String>, VcsError> {
        Ok(self.log_nodes(revset)?.into_iter().next())
    }

    fn bookmarks(&self) -> Result<BTreeMap<String, String>, VcsError> {
        let out = self.hg(&["bookmarks", "-T", "{bookmark} {node}\\n"])?;
        Ok(out
            .lines()
            .filter_map(|line| line.trim().split_once(' '))
            .map(|(name, node)| (name.to_owned(), node.to_owned()))
            .collect())
    }

    /// First commit of `source` not on `onto`, once `source` descends from it.
    fn squash_root(&self, source: &str, onto: &str) -> Result<Option<String>, VcsError> {
        self.first_node(&format!(
            "first(({}::{}) - {})",
            sym(onto),
            sym(source),
            sym(onto)
        ))
    }

    fn is_bookmark(&self, name: &str) -> Result<bool, VcsError> {
        Ok(self.bookmarks()?.contains_key(name))
    }
}

/// Parse `{node}\x1f{desc}\x1e` records.
fn parse_records(out: &str) -> Vec<LogEntry> {
    out.split('\x1e')
        .filter_map(|record| {
            let (id, message) = record.trim_start().split_once('\x1f')?;
            Some(LogEntry {
                id: id.trim().to_owned(),
                message: message.trim_end().to_owned(),
            })
        })
        .collect()
}

/// Extract the bundle path from `strip` output.
fn backup_bundle(out: &str) -> Option<String> {
    out.lines()
        .find_map(|line| line.trim().strip_prefix("saved backup bundle to "))
        .map(str::to_owned)
}

impl RepositoryApi for HgRepository {
    fn backend(&self) -> Backend {
        Backend::Mercurial
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn scratch_dir(&self) -> Result<PathBuf, VcsError> {
        let dir = self.root.join(".hg").join("arcland");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn push_command(&self) -> &'static str {
        "hg push"
    }

    fn current_ref(&self) -> Result<Option<String>, VcsError> {
        let active = self.hg(&["log", "-r", ".", "-T", "{activebookmark}"])?;
        if !active.trim().is_empty() {
            return Ok(Some(active.trim().to_owned()));
        }
        let branch = self.hg(&["branch"])?;
        Ok(Some(branch.trim().to_owned()).filter(|b| !b.is_empty()))
    }

    fn ref_kind(&self, name: &str) -> Result<RefKind, VcsError> {
        if self.is_bookmark(name)? {
            Ok(RefKind::Bookmark)
        } else {
            Ok(RefKind::Branch)
        }
    }

    fn resolve(&self, spec: &str) -> Result<Option<String>, VcsError> {
        let out = self.run(&["log", "-r", &sym(spec), "-l", "1", "-T", "{node}"])?;
        Ok(out
            .success()
            .then(|| out.stdout.trim().to_owned())
            .filter(|node| !node.is_empty()))
    }

    fn working_copy_state(&self) -> Result<WorkingCopyState, VcsError> {
        let out = self.hg(&["status"])?;
        Ok(WorkingCopyState {
            staged: Vec::new(),
            unstaged: out
                .lines()
                .filter_map(|line| line.get(2..))
                .map(str::to_owned)
                .collect(),
        })
    }

    fn upstream_path(&self, branch: &str) -> Result<UpstreamPath, VcsError> {
        Ok(UpstreamPath {
            hops: vec![branch.to_owned()],
            remote: None,
            cycle: None,
        })
    }

    fn remote_tracking_ref(&self, _remote: &str, onto: &str) -> String {
        onto.to_owned()
    }

    fn pending_commits(&self, source: &str, onto: &str) -> Result<Vec<CommitSummary>, VcsError> {
        let ancestor = format!("ancestor({},{})", sym(onto), sym(source));
        let revset = format!("reverse(({ancestor}::{}) - {ancestor})", sym(source));
        let out = self.hg(&["log", "-r", &revset, "-T", "{node|short} {desc|firstline}\\n"])?;
        Ok(out
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let (id, summary) = line.split_once(' ').unwrap_or((line, ""));
                CommitSummary {
                    id: id.to_owned(),
                    summary: summary.to_owned(),
                }
            })
            .collect())
    }

    fn range_commits(&self, base: &str, head: &str) -> Result<Vec<LogEntry>, VcsError> {
        let ancestor = format!("ancestor({},{})", sym(base), sym(head));
        let revset = format!("reverse(({ancestor}::{}) - {ancestor})", sym(head));
        let out = self.hg(&["log", "-r", &revset, "-T", "{node}\\x1f{desc}\\x1e"])?;
        Ok(parse_records(&out))
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, VcsError> {
        self.first_node(&format!("ancestor({},{})", sym(a), sym(b)))
    }

    fn full_diff(&self, base: &str, head: &str) -> Result<String, VcsError> {
        self.hg(&["diff", "--git", "-U", "32767", "-r", base, "-r", head])
    }

    fn forks(
        &self,
        source: &str,
        onto: &str,
        _source_before: &str,
    ) -> Result<Vec<Fork>, VcsError> {
        let Some(root) = self.squash_root(source, onto)? else {
            return Ok(Vec::new());
        };
        let revset = format!(
            "roots(descendants({root}) - descendants({src}) - ({root}::{src}))",
            src = sym(source)
        );
        let out = self.hg(&["log", "-r", &revset, "-T", "{node}\\x1f{bookmarks}\\n"])?;
        Ok(out
            .lines()
            .filter_map(|line| line.split_once('\x1f'))
            .map(|(node, marks)| Fork {
                name: marks.split_whitespace().next().map(str::to_owned),
                commit: node.trim().to_owned(),
                base: None,
            })
            .collect())
    }

    fn fetch(&self, _remote: &str, _onto: &str) -> Result<(), VcsError> {
        Ok(())
    }

    #[instrument(skip(self))]
    fn pull_target(&self, remote: &str, onto: &str) -> Result<(), VcsError> {
        self.checkout(onto)?;
        let mut args = vec!["pull"];
        if !remote.is_empty() {
            args.push(remote);
        }
        let out = self.run(&args)?;

        // Some hg releases exit 1 after a pull that found nothing.
        let nothing_new = out.code == Some(1) && out.stdout.contains("no changes found");
        let out = if nothing_new {
            out
        } else {
            exec::check("hg", &args, out)?
        };

        let branch = self.hg(&["branch"])?;
        let diverged = format!("{onto}@{}", branch.trim());
        if out.stderr.contains(&diverged) || out.stdout.contains(&diverged) {
            return Err(VcsError::Diverged {
                message: format!(
                    "Local bookmark {onto} has diverged from the server's {onto} \
                     (now labeled {diverged}). Resolve the divergence and run \
                     'arcland land' again."
                ),
            });
        }
        self.checkout(onto)
    }

    fn is_ahead_of_remote(&self, remote: &str, onto: &str) -> Result<bool, VcsError> {
        if self.caps.phases {
            let phase = self.hg(&["log", "-r", &sym(onto), "-T", "{phase}"])?;
            return Ok(phase.trim() != "public");
        }
        let mut args = vec!["outgoing", "-r", onto];
        if !remote.is_empty() {
            args.push(remote);
        }
        Ok(self.run(&args)?.success())
    }

    fn checkout(&self, name: &str) -> Result<(), VcsError> {
        self.hg(&["update", name])?;
        Ok(())
    }

    fn return_to(&self, name: &str) -> Result<(), VcsError> {
        self.checkout(name)
    }

    fn rebase_source(&self, source: &str, onto: &str) -> Result<(), VcsError> {
        let tip = self.resolve(onto)?;
        let base = self.merge_base(onto, source)?;
        if tip.is_some() && tip == base {
            debug!(source, onto, "already based on target tip");
            return Ok(());
        }
        self.hg(&["rebase", "-d", onto, "-b", source, "--keepbranches"])?;
        Ok(())
    }

    fn merge_target_into_source(
        &self,
        _source: &str,
        _onto: &str,
        _message: &str,
    ) -> Result<(), VcsError> {
        Err(VcsError::Unsupported {
            operation: "updating with a merge",
            backend: "hg",
        })
    }

    fn abort_update(&self) -> Result<(), VcsError> {
        if self.root.join(".hg").join("rebasestate").exists() {
            self.hg(&["rebase", "--abort"])?;
        }
        if self.root.join(".hg").join("merge").join("state").exists() {
            self.hg(&["update", "--clean", "."])?;
        }
        Ok(())
    }

    fn rebase_fork(&self, fork: &Fork, source: &str) -> Result<(), VcsError> {
        self.hg(&[
            "rebase",
            "--keep",
            "--keepbranches",
            "-d",
            source,
            "-s",
            &fork.commit,
        ])?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn squash(
        &self,
        source: &str,
        onto: &str,
        message_file: &Path,
    ) -> Result<SquashOutcome, VcsError> {
        let root = self
            .squash_root(source, onto)?
            .ok_or_else(|| VcsError::NotFound {
                message: format!("commits on {source} that are not on {onto}"),
            })?;
        let source_node = self.resolve(source)?.ok_or_else(|| VcsError::NotFound {
            message: format!("revision `{source}`"),
        })?;
        let range = format!("({root}::{})", sym(source));
        let logfile = message_file.to_string_lossy();
        let args = [
            "rebase",
            "--collapse",
            "--keep",
            "--logfile",
            &logfile,
            "-r",
            &range,
            "-d",
            onto,
        ];
        let out = self.run(&args)?;
        if !out.success() {
            match self.run(&["rebase", "--abort"]) {
                Ok(abort) if abort.success() => {}
                Ok(abort) => warn!(stderr = %abort.stderr.trim(), "could not abort the collapse"),
                Err(err) => warn!(error = %err, "could not abort the collapse"),
            }
            exec::check("hg", &args, out)?;
        }

        if self.is_bookmark(source)? {
            // --collapse with --keep leaves bookmarks on the pre-collapse
            // revisions.
            self.hg(&["bookmark", "-f", onto])?;
            self.hg(&["bookmark", "-f", source, "-r", &source_node])?;
        }
        self.checkout(onto)?;
        Ok(SquashOutcome::Committed)
    }

    fn merge_no_ff(&self, _source: &str, _onto: &str) -> Result<(), VcsError> {
        Err(VcsError::Unsupported {
            operation: "landing with a merge commit",
            backend: "hg",
        })
    }

    fn commit(&self, message_file: &Path) -> Result<(), VcsError> {
        let logfile = message_file.to_string_lossy();
        self.hg(&["commit", "--logfile", &logfile])?;
        Ok(())
    }

    fn reparent_children(
        &self,
        source: &str,
        _source_commit: &str,
        onto: &str,
    ) -> Result<Vec<String>, VcsError> {
        let children = self.log_nodes(&format!("children({})", sym(source)))?;
        for child in &children {
            self.hg(&["rebase", "-d", onto, "-s", child, "--keep", "--keepbranches"])?;
        }
        if !children.is_empty() {
            self.checkout(onto)?;
        }
        Ok(children)
    }

    #[instrument(skip(self))]
    fn push(&self, remote: &str, onto: &str) -> Result<(), VcsError> {
        let mut args = vec!["push"];
        if !self.caps.subversion {
            args.extend(["-r", onto]);
        }
        if !remote.is_empty() {
            args.push(remote);
        }
        self.hg(&args)?;
        Ok(())
    }

    fn snapshot(
        &self,
        original_ref: &str,
        source: &str,
        onto: &str,
    ) -> Result<Snapshot, VcsError> {
        let onto_commit = self.resolve(onto)?.ok_or_else(|| VcsError::NotFound {
            message: format!("revision `{onto}`"),
        })?;
        let source_commit = self.resolve(source)?.ok_or_else(|| VcsError::NotFound {
            message: format!("revision `{source}`"),
        })?;

        let bundle = self
            .scratch_dir()?
            .join(format!("land-backup-{}.hg", source_commit.get(..12).unwrap_or(&source_commit)));
        let bundle_arg = bundle.to_string_lossy();
        let args = ["bundle", "--base", &onto_commit, "-r", &source_commit, &bundle_arg];
        let out = self.run(&args)?;
        // Exit 1 means the source has no commits beyond the target.
        let backup = match out.code {
            Some(1) => None,
            _ => {
                exec::check("hg", &args, out)?;
                Some(bundle.clone())
            }
        };

        Ok(Snapshot {
            original_ref: original_ref.to_owned(),
            onto: onto.to_owned(),
            onto_commit,
            source: source.to_owned(),
            source_commit,
            refs: self.bookmarks()?,
            heads: self.log_nodes("heads(all())")?,
            backup,
        })
    }

    #[instrument(skip(self, snapshot), fields(onto = %snapshot.onto, source = %snapshot.source))]
    fn restore(&self, snapshot: &Snapshot) -> Result<(), VcsError> {
        self.abort_update()?;
        self.hg(&["update", "--clean", &snapshot.onto_commit])?;

        if !snapshot.heads.is_empty() {
            let known: Vec<String> = snapshot
                .heads
                .iter()
                .map(|head| format!("present({head})"))
                .collect();
            let created = format!(
                "descendants({}) - ::({})",
                snapshot.onto_commit,
                known.join(" + ")
            );
            let nodes = self.log_nodes(&created)?;
            if !nodes.is_empty() {
                debug!(count = nodes.len(), "stripping commits created by land");
                let mut args = STRIP.to_vec();
                args.extend(["-r", &created]);
                self.hg(&args)?;
            }
        }

        if let Some(bundle) = snapshot.backup.as_deref().filter(|b| b.exists()) {
            let path = bundle.to_string_lossy();
            self.hg(&["unbundle", &path])?;
        }

        let current = self.bookmarks()?;
        for (name, node) in &snapshot.refs {
            if current.get(name) != Some(node) {
                self.hg(&["bookmark", "-f", "-r", node, name])?;
            }
        }
        self.hg(&["update", "--clean", &snapshot.original_ref])?;
        Ok(())
    }

    fn delete_source(&self, source: &str, onto: &str) -> Result<Option<String>, VcsError> {
        let ancestor = format!("ancestor({},{})", sym(onto), sym(source));
        let root = self.first_node(&format!(
            "first(({ancestor}::{}) - {ancestor})",
            sym(source)
        ))?;
        let mut hint = None;
        if let Some(root) = root {
            let mut args = STRIP.to_vec();
            args.extend(["-r", &root]);
            let out = self.hg(&args)?;
            hint = backup_bundle(&out).map(|bundle| format!("hg unbundle {bundle}"));
        }
        if self.is_bookmark(source)? {
            self.hg(&["bookmark", "-d", source])?;
        }
        Ok(hint)
    }

    fn delete_remote_source(&self, remote: &str, source: &str) -> Result<bool, VcsError> {
        // Pushing a bookmark that no longer exists locally deletes it remotely.
        let mut args = vec!["push", "-B", source];
        if !remote.is_empty() {
            args.push(remote);
        }
        let out = self.run(&args)?;
        if out.stderr.contains("does not exist") {
            return Ok(false);
        }
        // Exit 1 only means no changesets went out with the bookmark.
        if out.code != Some(1) {
            exec::check("hg", &args, out)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Replies to commands by prefix match and records every invocation.
    #[derive(Clone, Default)]
    struct Script {
        replies: Arc<Mutex<Vec<(String, CommandOutput)>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Script {
        fn reply(&self, prefix: &str, out: CommandOutput) {
            self.replies.lock().unwrap().push((prefix.to_owned(), out));
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Runner for Script {
        fn run(&self, program: &str, args: &[&str], _cwd: &Path) -> Result<CommandOutput, VcsError> {
            let line = format!("{program} {}", args.join(" "));
            self.calls.lock().unwrap().push(line.clone());
            let replies = self.replies.lock().unwrap();
            Ok(replies
                .iter()
                .rev()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map_or_else(|| CommandOutput::ok(""), |(_, out)| out.clone()))
        }
    }

    fn repo(script: &Script) -> HgRepository {
        script.reply("hg root", CommandOutput::ok("/work/repo\n"));
        script.reply("hg config extensions.rebase", CommandOutput::ok(""));
        script.reply("hg log -r . -T {phase}", CommandOutput::ok("draft"));
        HgRepository::with_runner(Path::new("/work/repo"), Box::new(script.clone())).unwrap()
    }

    #[test]
    fn probes_capabilities_on_open() {
        let script = Script::default();
        let repo = repo(&script);
        assert!(repo.capabilities().rebase);
        assert!(repo.capabilities().phases);
        assert_eq!(repo.root(), Path::new("/work/repo"));
    }

    #[test]
    fn missing_rebase_extension_is_detected() {
        let script = Script::default();
        script.reply("hg root", CommandOutput::ok("/work/repo\n"));
        script.reply("hg config extensions.rebase", CommandOutput::failed(1, ""));
        let repo =
            HgRepository::with_runner(Path::new("/work/repo"), Box::new(script.clone())).unwrap();
        assert!(!repo.capabilities().rebase);
    }

    #[test]
    fn pull_tolerates_no_changes_exit() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply(
            "hg pull",
            CommandOutput {
                code: Some(1),
                stdout: "pulling from ssh://hg/repo\nno changes found\n".into(),
                stderr: String::new(),
            },
        );
        script.reply("hg branch", CommandOutput::ok("default\n"));
        repo.pull_target("", "master").unwrap();
        assert!(script.calls().contains(&"hg pull".to_owned()));
    }

    #[test]
    fn pull_rejects_diverged_bookmark() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply(
            "hg pull",
            CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: "divergent bookmark master stored as master@default\n".into(),
            },
        );
        script.reply("hg branch", CommandOutput::ok("default\n"));
        let err = repo.pull_target("", "master").unwrap_err();
        assert!(matches!(err, VcsError::Diverged { .. }));
        assert!(err.to_string().contains("master@default"));
    }

    #[test]
    fn pull_propagates_real_failures() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply("hg pull", CommandOutput::failed(255, "abort: no route to host"));
        let err = repo.pull_target("", "master").unwrap_err();
        assert!(matches!(err, VcsError::CommandFailed { code: Some(255), .. }));
    }

    #[test]
    fn draft_target_is_ahead() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply("hg log -r 'master' -T {phase}", CommandOutput::ok("draft"));
        assert!(repo.is_ahead_of_remote("", "master").unwrap());
        script.reply("hg log -r 'master' -T {phase}", CommandOutput::ok("public"));
        assert!(!repo.is_ahead_of_remote("", "master").unwrap());
    }

    #[test]
    fn rebase_skipped_when_already_on_tip() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply("hg log -r 'master' -l 1", CommandOutput::ok("aaaa"));
        script.reply("hg log -r ancestor(", CommandOutput::ok("aaaa\n"));
        repo.rebase_source("feature", "master").unwrap();
        assert!(!script.calls().iter().any(|c| c.starts_with("hg rebase")));
    }

    #[test]
    fn squash_collapses_and_repins_bookmarks() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply("hg log -r first(", CommandOutput::ok("rootnode\n"));
        script.reply("hg log -r 'feature' -l 1", CommandOutput::ok("tipnode"));
        script.reply("hg bookmarks", CommandOutput::ok("feature tipnode\nmaster ontonode\n"));
        let outcome = repo
            .squash("feature", "master", Path::new("/tmp/msg"))
            .unwrap();
        assert_eq!(outcome, SquashOutcome::Committed);
        let calls = script.calls();
        assert!(calls.iter().any(|c| c.starts_with(
            "hg rebase --collapse --keep --logfile /tmp/msg -r (rootnode::'feature') -d master"
        )));
        assert!(calls.contains(&"hg bookmark -f master".to_owned()));
        assert!(calls.contains(&"hg bookmark -f feature -r tipnode".to_owned()));
        assert_eq!(calls.last().map(String::as_str), Some("hg update master"));
    }

    #[test]
    fn failed_collapse_is_aborted() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply("hg log -r first(", CommandOutput::ok("rootnode\n"));
        script.reply("hg log -r 'feature' -l 1", CommandOutput::ok("tipnode"));
        script.reply("hg rebase --collapse", CommandOutput::failed(1, "conflicts"));
        repo.squash("feature", "master", Path::new("/tmp/msg"))
            .unwrap_err();
        assert!(script.calls().contains(&"hg rebase --abort".to_owned()));
    }

    #[test]
    fn failed_abort_keeps_the_collapse_error() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply("hg log -r first(", CommandOutput::ok("rootnode\n"));
        script.reply("hg log -r 'feature' -l 1", CommandOutput::ok("tipnode"));
        script.reply("hg rebase --collapse", CommandOutput::failed(1, "conflicts in widget.rs"));
        script.reply("hg rebase --abort", CommandOutput::failed(255, "abort: no rebase in progress"));
        let err = repo
            .squash("feature", "master", Path::new("/tmp/msg"))
            .unwrap_err();
        assert!(matches!(err, VcsError::CommandFailed { code: Some(1), .. }), "{err:?}");
        assert!(err.to_string().contains("conflicts in widget.rs"));
    }

    #[test]
    fn forks_carry_bookmark_names() {
        let script = Script::default();
        let repo = repo(&script);
        script.reply("hg log -r first(", CommandOutput::ok("rootnode\n"));
        script.reply("hg log -r roots(", CommandOutput::ok("forknode\x1fside other\n"));
        let forks = repo.forks("feature", "master", "").unwrap();
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].name.as_deref(), Some("side"));
        assert_eq!(forks[0].commit, "forknode");
    }

    #[test]
    fn merge_strategies_are_unsupported() {
        let script = Script::default();
        let repo = repo(&script);
        assert!(matches!(
            repo.merge_no_ff("feature", "master"),
            Err(VcsError::Unsupported { .. })
        ));
        assert!(matches!(
            repo.merge_target_into_source("feature", "master", "msg"),
            Err(VcsError::Unsupported { .. })
        ));
    }

    #[test]
    fn strip_output_yields_recovery_hint() {
        assert_eq!(
            backup_bundle("saved backup bundle to /r/.hg/strip-backup/abc-backup.hg\n").as_deref(),
            Some("/r/.hg/strip-backup/abc-backup.hg")
        );
    }

    #[test]
    fn symbols_are_quoted() {
        assert_eq!(sym("feature/x"), "'feature/x'");
        assert_eq!(sym("it's"), "'it\\'s'");
    }
}
