use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context as _, Result};
use arcland::compare::{CompareOptions, compare};
use arcland::config::ArcConfig;
use arcland::prompt::TerminalPrompter;
use arcland::report::{ConsoleReporter, Reporter, TracingEvents};
use arcland::review::{Conduit, ConduitError, HttpConduit, ReviewClient};
use arcland::strategy::StrategyFlags;
use arcland::{LandError, LandOptions, LandOutcome, LandWorkflow, telemetry};
use arcland_vcs::RepositoryApi;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;

/// Land reviewed revisions onto their target branch
///
/// arcland publishes an accepted revision from your working copy: it
/// resolves the target, checks the revision against repository policy,
/// squashes or merges the branch, pushes, and closes the revision. When the
/// repository uses a submit queue, the merge is handed to the queue instead.
#[derive(Parser)]
#[command(name = "arcland")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'arcland <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish an accepted revision onto its target branch
    ///
    /// Lands the checked-out branch, or BRANCH when given. The revision is
    /// found from the branch's commits unless --revision names it.
    Land(LandArgs),

    /// Compare a commit with the revision it was landed from
    ///
    /// Exit status: 0 content matched, 1 error, 2 no revision found,
    /// 3 content did not match.
    Compare(CompareArgs),

    /// Print a shell completion script
    Completions {
        /// Shell to generate for.
        shell: Shell,
    },
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct LandArgs {
    /// Branch or bookmark to land (defaults to the current one).
    branch: Option<String>,

    /// Land onto this branch or bookmark.
    #[arg(long)]
    onto: Option<String>,

    /// Push to this remote.
    #[arg(long)]
    remote: Option<String>,

    /// Land this revision instead of the one found from the branch.
    #[arg(long, value_parser = parse_revision)]
    revision: Option<u64>,

    /// Commit the change locally but do not push it.
    #[arg(long)]
    hold: bool,

    /// Keep the feature branch after landing.
    #[arg(long)]
    keep_branch: bool,

    /// Land as a single squashed commit.
    #[arg(long, conflicts_with = "merge")]
    squash: bool,

    /// Land with a merge commit.
    #[arg(long, conflicts_with_all = ["update_with_rebase", "update_with_merge"])]
    merge: bool,

    /// Rebase the feature branch onto the target before landing.
    #[arg(long, conflicts_with = "update_with_merge")]
    update_with_rebase: bool,

    /// Merge the target into the feature branch before landing.
    #[arg(long)]
    update_with_merge: bool,

    /// Show the commits that would land, then stop.
    #[arg(long)]
    preview: bool,

    /// Delete the feature branch on the remote after landing.
    #[arg(long, conflicts_with = "keep_branch")]
    delete_remote: bool,

    /// To-be-reviewed: skip the submit queue, filing a task with your reason.
    #[arg(long)]
    tbr: bool,

    /// Do not run the configured unit tests.
    #[arg(long)]
    nounit: bool,

    /// Land through the submit queue even when the repository does not
    /// enable it.
    #[arg(long)]
    use_sq: bool,

    /// After queueing, do not fetch the target.
    #[arg(long)]
    skip_update: bool,

    /// Answer yes to every confirmation.
    #[arg(short = 'y', long)]
    yes: bool,
}

#[derive(Args)]
struct CompareArgs {
    /// The commit to check.
    #[arg(long)]
    commit: String,

    /// Revision to compare with (defaults to the one named in the commit
    /// message).
    #[arg(long, value_parser = parse_revision)]
    revision: Option<u64>,

    /// Save both normalized patches to DIR.
    #[arg(long, value_name = "DIR")]
    keep_diffs: Option<PathBuf>,

    /// Compare hunk line numbers too.
    #[arg(long)]
    no_normalize_line_numbers: bool,
}

fn parse_revision(raw: &str) -> Result<u64, String> {
    let digits = raw.strip_prefix('D').unwrap_or(raw);
    digits
        .parse()
        .map_err(|_| format!("'{raw}' is not a revision id (expected D123 or 123)"))
}

impl LandArgs {
    fn options(&self) -> LandOptions {
        LandOptions {
            branch: self.branch.clone(),
            onto: self.onto.clone(),
            remote: self.remote.clone(),
            revision: self.revision,
            strategy: StrategyFlags {
                squash: self.squash,
                merge: self.merge,
                update_with_rebase: self.update_with_rebase,
                update_with_merge: self.update_with_merge,
                hold: self.hold,
                keep_branch: self.keep_branch,
                preview: self.preview,
                delete_remote: self.delete_remote,
            },
            tbr: self.tbr,
            nounit: self.nounit,
            use_sq: self.use_sq,
            skip_update: self.skip_update,
        }
    }
}

struct Context {
    repo: Box<dyn RepositoryApi>,
    config: ArcConfig,
}

fn context() -> Result<Context> {
    let cwd = std::env::current_dir().context("could not read the current directory")?;
    let repo = arcland_vcs::open(&cwd).map_err(LandError::from)?;
    let config = ArcConfig::discover(repo.root()).map_err(LandError::from)?;
    Ok(Context { repo, config })
}

/// The review server client, or `None` for a preview without `review.uri`.
fn conduit(config: &ArcConfig, preview: bool) -> Result<Option<HttpConduit>> {
    let Some(uri) = config.review.uri.as_deref() else {
        if preview {
            return Ok(None);
        }
        return Err(LandError::usage("review.uri is not set in .arcland.toml").into());
    };
    let conduit = HttpConduit::new(
        uri,
        config.review.token.clone(),
        Duration::from_secs(config.review.timeout_secs),
    )
    .context("could not build the review server client")?;
    Ok(Some(conduit))
}

/// Stands in for the review server when none is configured.
struct Offline;

impl Conduit for Offline {
    fn call(&self, method: &str, _: Value) -> Result<Value, ConduitError> {
        Err(ConduitError::Decode {
            method: method.to_owned(),
            message: "review.uri is not set".to_owned(),
        })
    }
}

fn land(args: &LandArgs) -> Result<ExitCode> {
    let ctx = context()?;
    let http = conduit(&ctx.config, args.preview)?;
    let conduit: &dyn Conduit = match &http {
        Some(http) => http,
        None => &Offline,
    };
    let reporter = ConsoleReporter;
    let mut prompter = TerminalPrompter {
        assume_yes: args.yes,
    };
    let outcome = LandWorkflow::new(ctx.repo.as_ref(), conduit, &ctx.config, &reporter)
        .run(&args.options(), &mut prompter, &mut TracingEvents)?;
    match outcome {
        LandOutcome::Pushed { commit } => reporter.info("DONE", &format!("Landed {commit}.")),
        LandOutcome::Held | LandOutcome::Previewed => {}
        LandOutcome::Queued { url } => {
            reporter.info("DONE", &format!("Queued; track the merge at {url}"));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn compare_commit(args: CompareArgs) -> Result<ExitCode> {
    let ctx = context()?;
    let conduit = conduit(&ctx.config, false)?
        .ok_or_else(|| LandError::usage("review.uri is not set in .arcland.toml"))?;
    let options = CompareOptions {
        commit: args.commit,
        revision: args.revision,
        keep_diffs: args.keep_diffs,
        no_normalize_line_numbers: args.no_normalize_line_numbers,
    };
    let comparison = compare(
        ctx.repo.as_ref(),
        ReviewClient::new(&conduit),
        &options,
        &ConsoleReporter,
    )?;
    Ok(exit_code(comparison.exit_code()))
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _telemetry = telemetry::init("warn");

    let result = match cli.command {
        Commands::Land(args) => land(&args),
        Commands::Compare(args) => compare_commit(args),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "arcland", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", render(&err));
            exit_code(err.downcast_ref::<LandError>().map_or(1, LandError::exit_code))
        }
    }
}

/// A [`LandError`] already names its cause; anything else prints its chain.
fn render(err: &anyhow::Error) -> String {
    match err.downcast_ref::<LandError>() {
        Some(land) => land.to_string(),
        None => format!("{err:#}"),
    }
}
