//! Operator-facing output and land events.
//!
//! The workflow never prints directly. It writes tagged lines through a
//! [`Reporter`] and announces pushes through an [`EventSink`], both passed
//! in by the caller.

use std::io::Write as _;

use tracing::info;

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Where status lines go.
pub trait Reporter {
    /// A tagged informational line, e.g. `TARGET` / `Landing onto master`.
    fn info(&self, tag: &str, message: &str);

    /// A tagged warning line.
    fn warn(&self, tag: &str, message: &str);

    /// An untagged line.
    fn line(&self, message: &str);
}

/// [`Reporter`] writing to the terminal and mirroring each line to tracing.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn info(&self, tag: &str, message: &str) {
        info!(tag, "{message}");
        let _ = writeln!(std::io::stderr(), " {tag:>8}  {message}");
    }

    fn warn(&self, tag: &str, message: &str) {
        tracing::warn!(tag, "{message}");
        let _ = writeln!(std::io::stderr(), " {tag:>8}  {message}");
    }

    fn line(&self, message: &str) {
        let _ = writeln!(std::io::stdout(), "{message}");
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Notifications fired around the push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LandEvent {
    /// The landed commit exists locally and is about to be pushed.
    WillPushRevision {
        /// Revision id.
        revision_id: u64,
        /// The landed commit.
        commit: String,
    },
    /// The push succeeded.
    DidPushRevision {
        /// Revision id.
        revision_id: u64,
        /// The landed commit.
        commit: String,
    },
}

/// Receives [`LandEvent`]s.
pub trait EventSink {
    /// Handle one event.
    fn dispatch(&mut self, event: &LandEvent);
}

/// [`EventSink`] that records events in the trace.
#[derive(Debug, Default)]
pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn dispatch(&mut self, event: &LandEvent) {
        match event {
            LandEvent::WillPushRevision {
                revision_id,
                commit,
            } => info!(revision_id, commit = %commit, "will push revision"),
            LandEvent::DidPushRevision {
                revision_id,
                commit,
            } => info!(revision_id, commit = %commit, "did push revision"),
        }
    }
}
