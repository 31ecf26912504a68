//! End-to-end land scenarios against real git repositories.

mod common;

use arcland::config::ArcConfig;
use arcland::prompt::Decision;
use arcland::report::LandEvent;
use arcland::strategy::StrategyFlags;
use arcland::testing::{
    FakeConduit, RecordingEvents, RecordingReporter, ScriptedPrompter, revision_json,
};
use arcland::{LandError, LandOptions, LandOutcome, LandWorkflow};
use common::{Fixture, LANDED_MESSAGE, REVISION, commit_file, git, review_server,
    review_server_with};

struct Run {
    result: Result<LandOutcome, LandError>,
    reporter: RecordingReporter,
    prompter: ScriptedPrompter,
    events: RecordingEvents,
}

fn land(
    fx: &Fixture,
    conduit: &FakeConduit,
    config: &ArcConfig,
    options: &LandOptions,
    answers: Vec<Decision>,
) -> Run {
    let repo = fx.repo();
    let reporter = RecordingReporter::default();
    let mut prompter = ScriptedPrompter::new(answers);
    let mut events = RecordingEvents::default();
    let result = LandWorkflow::new(repo.as_ref(), conduit, config, &reporter).run(
        options,
        &mut prompter,
        &mut events,
    );
    Run {
        result,
        reporter,
        prompter,
        events,
    }
}

fn flags(update: impl FnOnce(&mut StrategyFlags)) -> LandOptions {
    let mut strategy = StrategyFlags::default();
    update(&mut strategy);
    LandOptions {
        strategy,
        ..LandOptions::default()
    }
}

// ===========================================================================
// Straight-through
// ===========================================================================

#[test]
fn accepted_revision_lands_without_prompts() {
    let fx = Fixture::new();
    fx.feature("feature");
    let conduit = review_server();

    let run = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![]);
    let outcome = run.result.unwrap();

    let LandOutcome::Pushed { commit } = outcome else {
        panic!("expected a push, got {outcome:?}");
    };
    assert!(run.prompter.asked().is_empty());
    assert_eq!(fx.remote_rev("master"), commit);
    assert_eq!(
        git(fx.dir(), &["log", "-1", "--format=%B", "master"]),
        LANDED_MESSAGE.trim()
    );
    // One squashed commit on top of the initial one.
    assert_eq!(git(fx.dir(), &["rev-list", "--count", "master"]), "2");
    assert!(!fx.has_branch("feature"));
    assert_eq!(fx.current_branch(), "master");

    assert!(conduit.methods().contains(&"differential.close".to_owned()));
    assert_eq!(
        run.events.events,
        vec![
            LandEvent::WillPushRevision {
                revision_id: REVISION,
                commit: commit.clone(),
            },
            LandEvent::DidPushRevision {
                revision_id: REVISION,
                commit,
            },
        ]
    );
    assert!(run.reporter.output().contains("git checkout -b feature"));
}

#[test]
fn landing_another_branch_returns_to_the_original() {
    let fx = Fixture::new();
    fx.feature("feature");
    git(fx.dir(), &["checkout", "-q", "-b", "scratch", "master"]);
    let conduit = review_server();

    let options = LandOptions {
        branch: Some("feature".to_owned()),
        ..LandOptions::default()
    };
    let run = land(&fx, &conduit, &ArcConfig::default(), &options, vec![]);
    assert!(run.result.unwrap().was_pushed());
    assert_eq!(fx.current_branch(), "scratch");
    assert!(!fx.has_branch("feature"));
}

#[test]
fn keep_branch_leaves_source_checked_out() {
    let fx = Fixture::new();
    let tip = fx.feature("feature");
    let conduit = review_server();

    let options = flags(|f| f.keep_branch = true);
    let run = land(&fx, &conduit, &ArcConfig::default(), &options, vec![]);
    assert!(run.result.unwrap().was_pushed());
    assert!(fx.has_branch("feature"));
    assert_eq!(fx.rev("feature"), tip);
    assert_eq!(fx.current_branch(), "feature");
}

#[test]
fn merge_strategy_records_a_merge_commit() {
    let fx = Fixture::new();
    fx.feature("feature");
    let conduit = review_server();

    let options = flags(|f| f.merge = true);
    let run = land(&fx, &conduit, &ArcConfig::default(), &options, vec![]);
    assert!(run.result.unwrap().was_pushed());
    let parents = git(fx.remote.path(), &["log", "-1", "--format=%P", "master"]);
    assert_eq!(parents.split_whitespace().count(), 2);
}

#[test]
fn target_moved_on_remote_is_merged_in() {
    let fx = Fixture::new();
    fx.feature("feature");

    // Someone else lands first.
    let other = tempfile::TempDir::new().unwrap();
    let url = fx.remote.path().to_string_lossy().into_owned();
    git(other.path(), &["clone", "-q", &url, "."]);
    git(other.path(), &["config", "user.email", "other@test.com"]);
    git(other.path(), &["config", "user.name", "Other"]);
    commit_file(other.path(), "NOTES.md", "notes\n", "Add notes");
    git(other.path(), &["push", "-q", "origin", "master"]);

    let conduit = review_server();
    let run = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![]);
    assert!(run.result.unwrap().was_pushed());
    let files = git(fx.remote.path(), &["ls-tree", "--name-only", "master"]);
    assert!(files.contains("NOTES.md"));
    assert!(files.contains("widget.rs"));
}

// ===========================================================================
// Stopping early
// ===========================================================================

#[test]
fn hold_commits_locally_without_pushing() {
    let fx = Fixture::new();
    fx.feature("feature");
    let before = fx.remote_rev("master");
    let conduit = review_server();

    let options = flags(|f| f.hold = true);
    let run = land(&fx, &conduit, &ArcConfig::default(), &options, vec![]);
    assert_eq!(run.result.unwrap(), LandOutcome::Held);

    assert_eq!(fx.remote_rev("master"), before);
    assert_ne!(fx.rev("master"), before);
    assert!(fx.has_branch("feature"));
    assert!(!conduit.methods().contains(&"differential.close".to_owned()));
    assert_eq!(run.events.events.len(), 1);
    assert!(run.reporter.output().contains("it has NOT been pushed yet"));
}

#[test]
fn preview_lists_commits_and_touches_nothing() {
    let fx = Fixture::new();
    let tip = fx.feature("feature");
    let conduit = review_server();

    let options = flags(|f| f.preview = true);
    let run = land(&fx, &conduit, &ArcConfig::default(), &options, vec![]);
    assert_eq!(run.result.unwrap(), LandOutcome::Previewed);

    let output = run.reporter.output();
    assert!(output.contains("The following commit(s) will be landed:"));
    assert!(output.contains("Wire widget"));
    assert!(output.contains("Add widget"));
    assert_eq!(fx.current_branch(), "feature");
    assert_eq!(fx.rev("feature"), tip);
    assert!(conduit.calls().is_empty());
}

#[test]
fn nothing_to_land_is_rejected() {
    let fx = Fixture::new();
    git(fx.dir(), &["checkout", "-q", "-b", "empty", "master"]);
    let conduit = review_server();

    let options = flags(|f| f.preview = true);
    let err = land(&fx, &conduit, &ArcConfig::default(), &options, vec![])
        .result
        .unwrap_err();
    assert!(err.is_usage());
    assert_eq!(err.to_string(), "No commits to land from empty.");
    assert_eq!(fx.current_branch(), "empty");
}

// ===========================================================================
// Refusals
// ===========================================================================

#[test]
fn landing_a_branch_onto_itself_is_rejected() {
    let fx = Fixture::new();
    let conduit = review_server();

    let err = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![])
        .result
        .unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("onto itself"));
    assert!(conduit.calls().is_empty());
}

#[test]
fn strict_policy_blocks_unaccepted_revision_before_any_change() {
    let fx = Fixture::new();
    let tip = fx.feature("feature");
    let mut revision = revision_json(REVISION, "Land the widget");
    revision["status"] = "0".into();
    let conduit = review_server_with(revision);
    let mut config = ArcConfig::default();
    config.land.prevent_unaccepted = true;

    let run = land(&fx, &conduit, &config, &LandOptions::default(), vec![]);
    let err = run.result.unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("has not been accepted"));
    assert!(run.prompter.asked().is_empty());

    assert_eq!(fx.current_branch(), "feature");
    assert_eq!(fx.rev("feature"), tip);
    assert_eq!(fx.rev("master"), fx.remote_rev("master"));
    assert!(git(fx.dir(), &["status", "--porcelain"]).is_empty());
}

#[test]
fn declining_unaccepted_prompt_aborts() {
    let fx = Fixture::new();
    fx.feature("feature");
    let mut revision = revision_json(REVISION, "Land the widget");
    revision["status"] = "0".into();
    let conduit = review_server_with(revision);

    let run = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![
        Decision::Decline,
    ]);
    let err = run.result.unwrap_err();
    assert!(err.is_aborted());
    assert_eq!(err.exit_code(), 2);
    assert_eq!(fx.current_branch(), "feature");
}

#[test]
fn dirty_working_copy_is_rejected() {
    let fx = Fixture::new();
    fx.feature("feature");
    std::fs::write(fx.dir().join("stray.txt"), "x").unwrap();
    let conduit = review_server();

    let err = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![])
        .result
        .unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("stray.txt"));
}

#[test]
fn local_target_ahead_of_remote_is_rejected() {
    let fx = Fixture::new();
    commit_file(fx.dir(), "local.txt", "x\n", "Unpushed work");
    fx.feature("feature");
    let conduit = review_server();

    let err = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![])
        .result
        .unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("is ahead of remote branch 'origin/master'"));
    assert_eq!(fx.current_branch(), "feature");
}

// ===========================================================================
// Rollback
// ===========================================================================

#[test]
fn rejected_push_restores_everything() {
    let fx = Fixture::new();
    let tip = fx.feature("feature");
    let master = fx.rev("master");
    fx.reject_pushes();
    let conduit = review_server();

    let run = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![]);
    let err = run.result.unwrap_err();
    assert!(err.to_string().contains("'git push' failed!"));

    let tags = run.reporter.tags();
    assert!(tags.contains(&"PUSH FAILED!".to_owned()));
    assert!(tags.contains(&"ROLLBACK".to_owned()));
    assert!(!tags.contains(&"ROLLBACK FAILED".to_owned()));

    assert_eq!(fx.current_branch(), "feature");
    assert_eq!(fx.rev("feature"), tip);
    assert_eq!(fx.rev("master"), master);
    assert_eq!(fx.remote_rev("master"), master);
    assert!(git(fx.dir(), &["status", "--porcelain"]).is_empty());
    assert!(!conduit.methods().contains(&"differential.close".to_owned()));
}

#[test]
fn conflicting_update_rolls_back_with_hint() {
    let fx = Fixture::new();
    let tip = fx.feature("feature");

    let other = tempfile::TempDir::new().unwrap();
    let url = fx.remote.path().to_string_lossy().into_owned();
    git(other.path(), &["clone", "-q", &url, "."]);
    git(other.path(), &["config", "user.email", "other@test.com"]);
    git(other.path(), &["config", "user.name", "Other"]);
    commit_file(other.path(), "widget.rs", "fn gadget() {}\n", "Conflicting widget");
    git(other.path(), &["push", "-q", "origin", "master"]);

    let conduit = review_server();
    let err = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![])
        .result
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("does not merge cleanly"), "{message}");
    assert!(message.contains("git merge --abort"));

    assert_eq!(fx.current_branch(), "feature");
    assert_eq!(fx.rev("feature"), tip);
    assert!(git(fx.dir(), &["status", "--porcelain"]).is_empty());
}

// ===========================================================================
// Forks
// ===========================================================================

fn feature_with_fork(fx: &Fixture) -> String {
    let tip = fx.feature("feature");
    git(fx.dir(), &["checkout", "-q", "-b", "side", "feature~1"]);
    commit_file(fx.dir(), "side.rs", "fn side() {}\n", "Side work");
    git(fx.dir(), &["checkout", "-q", "feature"]);
    tip
}

#[test]
fn abort_at_fork_prompt_restores_working_copy() {
    let fx = Fixture::new();
    let tip = feature_with_fork(&fx);
    let conduit = review_server();

    let run = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![
        Decision::Choice("a".to_owned()),
    ]);
    let err = run.result.unwrap_err();
    assert!(err.is_aborted());
    assert!(err.to_string().contains("side"));
    assert_eq!(run.prompter.asked().len(), 1);
    assert!(run.prompter.asked()[0].contains("1 branch(s) forking off of it"));

    assert_eq!(fx.current_branch(), "feature");
    assert_eq!(fx.rev("feature"), tip);
    assert_eq!(fx.rev("master"), fx.remote_rev("master"));
}

#[test]
fn keeping_forks_keeps_the_source() {
    let fx = Fixture::new();
    feature_with_fork(&fx);
    let conduit = review_server();

    let run = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![
        Decision::Choice("keep".to_owned()),
    ]);
    assert!(run.result.unwrap().was_pushed());
    assert!(fx.has_branch("feature"));
    assert!(fx.has_branch("side"));
    assert_eq!(fx.current_branch(), "feature");
}

#[test]
fn rebased_forks_move_onto_the_landed_commit() {
    let fx = Fixture::new();
    feature_with_fork(&fx);
    git(fx.dir(), &["checkout", "-q", "-b", "side2", "feature~1"]);
    commit_file(fx.dir(), "side2.rs", "fn side2() {}\n", "More side work");
    git(fx.dir(), &["checkout", "-q", "feature"]);
    let conduit = review_server();

    let run = land(&fx, &conduit, &ArcConfig::default(), &LandOptions::default(), vec![
        Decision::Choice("r".to_owned()),
    ]);
    assert!(run.result.unwrap().was_pushed());
    assert_eq!(run.prompter.asked().len(), 1);
    assert!(run.prompter.asked()[0].contains("2 branch(s) forking off of it"));

    assert!(!fx.has_branch("feature"));
    assert_eq!(fx.rev("master"), fx.remote_rev("master"));
    assert_eq!(fx.rev("side~1"), fx.rev("master"));
    assert_eq!(fx.rev("side2~1"), fx.rev("master"));
}
