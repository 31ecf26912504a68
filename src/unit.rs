//! Unit-test gate: run the configured test command before landing.

use std::io::Read as _;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::error::LandError;
use crate::prompt::{Prompter, confirm_or_abort};
use crate::report::Reporter;

/// Result of one run of the test command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitRun {
    /// Exit code; `None` when killed by the timeout or a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
    /// Whether the timeout killed it.
    pub timed_out: bool,
}

impl UnitRun {
    /// Whether the command exited 0.
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

fn drain(stream: Option<impl std::io::Read + Send + 'static>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut s) = stream {
            let _ = s.read_to_string(&mut buf);
        }
        buf
    })
}

/// Run `command` through `sh -c` in `working_dir`, killing it after
/// `timeout_secs`.
///
/// # Errors
/// Returns [`LandError::Io`] if the shell cannot be started or waited on.
#[instrument]
pub fn run_command(
    command: &str,
    working_dir: &Path,
    timeout_secs: u32,
) -> Result<UnitRun, LandError> {
    let timeout = Duration::from_secs(timeout_secs.into());
    let start = Instant::now();

    let mut child = Command::new("sh")
        .args(["-c", command])
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let (exit_code, timed_out) = loop {
        if let Some(status) = child.try_wait()? {
            break (status.code(), false);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            break (None, true);
        }
        thread::sleep(Duration::from_millis(50));
    };

    let mut stderr = stderr.join().unwrap_or_default();
    if timed_out {
        stderr.push_str(&format!("killed by timeout after {timeout_secs}s\n"));
    }
    Ok(UnitRun {
        exit_code,
        stdout: stdout.join().unwrap_or_default(),
        stderr,
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        timed_out,
    })
}

/// Run the unit gate. A failing run asks whether to land anyway.
///
/// # Errors
/// [`LandError::Aborted`] when the operator declines after a failure, or
/// [`LandError::Io`] if the command cannot be run.
pub fn run_gate(
    command: &str,
    working_dir: &Path,
    timeout_secs: u32,
    reporter: &dyn Reporter,
    prompter: &mut dyn Prompter,
) -> Result<UnitRun, LandError> {
    reporter.line("Running unit tests...");
    let run = run_command(command, working_dir, timeout_secs)?;
    if run.passed() {
        info!(duration_ms = run.duration_ms, "unit tests passed");
        reporter.info("UNIT OKAY", "No unit test failures.");
        return Ok(run);
    }

    warn!(exit_code = ?run.exit_code, timed_out = run.timed_out, "unit tests failed");
    reporter.warn("UNIT ERRORS", "Unit testing raised errors!");
    for stream in [&run.stdout, &run.stderr] {
        let trimmed = stream.trim_end();
        if !trimmed.is_empty() {
            reporter.line(trimmed);
        }
    }
    confirm_or_abort(prompter, "Revision does not pass unit tests. Continue anyway?")?;
    Ok(run)
}
