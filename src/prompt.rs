//! Interactive decisions.
//!
//! Every question the land workflow asks goes through a [`Prompter`] and
//! comes back as a [`Decision`]. A decline always becomes
//! [`LandError::Aborted`].

use std::io::{self, BufRead as _, Write as _};

use crate::error::LandError;

/// The operator's answer to a prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Yes / continue.
    Confirm,
    /// No, or an empty answer to a free-form question.
    Decline,
    /// A free-form answer.
    Choice(String),
}

/// Asks the operator questions.
pub trait Prompter {
    /// Ask a yes/no question. Anything but an explicit yes is a decline.
    ///
    /// # Errors
    /// Returns an error if the terminal cannot be read.
    fn confirm(&mut self, question: &str) -> io::Result<Decision>;

    /// Ask for a line of text. An empty answer is a decline.
    ///
    /// # Errors
    /// Returns an error if the terminal cannot be read.
    fn ask(&mut self, question: &str) -> io::Result<Decision>;
}

/// Ask `question`; a decline becomes [`LandError::Aborted`].
///
/// # Errors
/// Returns [`LandError::Aborted`] on decline, [`LandError::Io`] on terminal
/// failure.
pub fn confirm_or_abort(prompter: &mut dyn Prompter, question: &str) -> Result<(), LandError> {
    match prompter.confirm(question)? {
        Decision::Confirm => Ok(()),
        Decision::Decline | Decision::Choice(_) => Err(LandError::aborted(question)),
    }
}

/// Ask for free text; an empty answer becomes [`LandError::Aborted`].
///
/// # Errors
/// Returns [`LandError::Aborted`] on an empty answer, [`LandError::Io`] on
/// terminal failure.
pub fn ask_or_abort(prompter: &mut dyn Prompter, question: &str) -> Result<String, LandError> {
    match prompter.ask(question)? {
        Decision::Choice(answer) => Ok(answer),
        Decision::Confirm => Ok(String::new()),
        Decision::Decline => Err(LandError::aborted(question)),
    }
}

/// [`Prompter`] reading answers from stdin, writing questions to stderr.
#[derive(Debug, Default)]
pub struct TerminalPrompter {
    /// Answer yes to every confirmation without asking.
    pub assume_yes: bool,
}

impl TerminalPrompter {
    fn read_answer(question: &str, suffix: &str) -> io::Result<String> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{question}{suffix}")?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_owned())
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str) -> io::Result<Decision> {
        if self.assume_yes {
            eprintln!("{question} [y/N] y");
            return Ok(Decision::Confirm);
        }
        let answer = Self::read_answer(question, " [y/N] ")?;
        Ok(if matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes") {
            Decision::Confirm
        } else {
            Decision::Decline
        })
    }

    fn ask(&mut self, question: &str) -> io::Result<Decision> {
        let answer = Self::read_answer(question, "\n> ")?;
        Ok(if answer.is_empty() {
            Decision::Decline
        } else {
            Decision::Choice(answer)
        })
    }
}
