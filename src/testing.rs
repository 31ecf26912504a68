//! In-memory stand-ins for the review server, the terminal, and the event
//! sink. Used by unit tests and by the integration tests under `tests/`.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;

use serde_json::{Value, json};

use crate::prompt::{Decision, Prompter};
use crate::report::{EventSink, LandEvent, Reporter};
use crate::review::{Conduit, ConduitError, Revision};

// ---------------------------------------------------------------------------
// FakeConduit
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Scripted {
    Result(Value),
    Failure { code: String, info: String },
}

/// A [`Conduit`] answering from scripted responses.
///
/// Responses queue per method; the last one repeats once the queue drains.
/// Calling a method with nothing scripted is a decode error.
#[derive(Debug, Default)]
pub struct FakeConduit {
    scripts: RefCell<HashMap<String, VecDeque<Scripted>>>,
    calls: RefCell<Vec<(String, Value)>>,
}

impl FakeConduit {
    /// No scripted methods.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: &str, scripted: Scripted) {
        self.scripts
            .borrow_mut()
            .entry(method.to_owned())
            .or_default()
            .push_back(scripted);
    }

    /// Answer `method` with `result`.
    pub fn respond(&self, method: &str, result: Value) {
        self.push(method, Scripted::Result(result));
    }

    /// Answer `method` with a server error.
    pub fn fail(&self, method: &str, code: &str, info: &str) {
        self.push(
            method,
            Scripted::Failure {
                code: code.to_owned(),
                info: info.to_owned(),
            },
        );
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.borrow().clone()
    }

    /// Names of the methods called so far, in order.
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(m, _)| m.clone()).collect()
    }
}

impl Conduit for FakeConduit {
    fn call(&self, method: &str, params: Value) -> Result<Value, ConduitError> {
        self.calls.borrow_mut().push((method.to_owned(), params));
        let scripted = {
            let mut scripts = self.scripts.borrow_mut();
            let queue = scripts.get_mut(method);
            match queue {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match scripted {
            Some(Scripted::Result(value)) => Ok(value),
            Some(Scripted::Failure { code, info }) => Err(ConduitError::Remote {
                method: method.to_owned(),
                code,
                info,
            }),
            None => Err(ConduitError::Decode {
                method: method.to_owned(),
                message: "no scripted response".to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedPrompter
// ---------------------------------------------------------------------------

/// A [`Prompter`] giving canned answers. Declines once they run out.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<Decision>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    /// Answer with `answers`, in order.
    pub fn new(answers: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Every question asked so far.
    #[must_use]
    pub fn asked(&self) -> Vec<String> {
        self.asked.clone()
    }

    fn next(&mut self, question: &str) -> Decision {
        self.asked.push(question.to_owned());
        self.answers.pop_front().unwrap_or(Decision::Decline)
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, question: &str) -> io::Result<Decision> {
        Ok(self.next(question))
    }

    fn ask(&mut self, question: &str) -> io::Result<Decision> {
        Ok(self.next(question))
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter / RecordingEvents
// ---------------------------------------------------------------------------

/// A [`Reporter`] that keeps everything it is given.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    entries: RefCell<Vec<(Option<String>, String)>>,
}

impl RecordingReporter {
    /// Tags of the tagged lines, in order.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|(tag, _)| tag.clone())
            .collect()
    }

    /// All lines joined with newlines, tags included.
    #[must_use]
    pub fn output(&self) -> String {
        self.entries
            .borrow()
            .iter()
            .map(|(tag, message)| match tag {
                Some(tag) => format!("{tag} {message}"),
                None => message.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, tag: &str, message: &str) {
        self.entries
            .borrow_mut()
            .push((Some(tag.to_owned()), message.to_owned()));
    }

    fn warn(&self, tag: &str, message: &str) {
        self.info(tag, message);
    }

    fn line(&self, message: &str) {
        self.entries.borrow_mut().push((None, message.to_owned()));
    }
}

/// An [`EventSink`] that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    /// Events in dispatch order.
    pub events: Vec<LandEvent>,
}

impl EventSink for RecordingEvents {
    fn dispatch(&mut self, event: &LandEvent) {
        self.events.push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// The `differential.query` record of an accepted revision authored by
/// `PHID-USER-me`, with one diff numbered `id * 10`.
#[must_use]
pub fn revision_json(id: u64, title: &str) -> Value {
    json!({
        "id": id.to_string(),
        "phid": format!("PHID-DREV-{id}"),
        "title": title,
        "uri": format!("https://review.example.com/D{id}"),
        "status": "2",
        "authorPHID": "PHID-USER-me",
        "activeDiffPHID": format!("PHID-DIFF-{id}"),
        "diffs": [(id * 10).to_string()],
        "auxiliary": { "phabricator:depends-on": [] },
        "repositoryPHID": "PHID-REPO-1"
    })
}

/// [`revision_json`], decoded.
///
/// # Panics
/// If the fixture stops matching [`Revision::from_value`].
#[must_use]
pub fn revision(id: u64, title: &str) -> Revision {
    match Revision::from_value(revision_json(id, title)) {
        Ok(revision) => revision,
        Err(err) => panic!("revision fixture does not decode: {err}"),
    }
}
