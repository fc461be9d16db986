//! Confirmation gate in front of every live run.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::core::context::AccountContext;
use crate::core::errors::{Result, SweepError};
use crate::scheduler::cancel::CancelToken;
use crate::scheduler::clock::{Clock, sleep_unless_cancelled};

/// Operator interaction used by the gate.
pub trait Prompter {
    /// Show `prompt` and return the operator's answer line.
    fn ask(&mut self, prompt: &str) -> Result<String>;

    /// Informational message (e.g. the force countdown).
    fn notice(&mut self, _message: &str) {}
}

/// Prompts on stderr, reads answers from stdin.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "{prompt}\n> ");
        let _ = stderr.flush();
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|source| SweepError::io("<stdin>", source))?;
        Ok(line)
    }

    fn notice(&mut self, message: &str) {
        let _ = writeln!(io::stderr(), "{message}");
    }
}

/// Prompter with canned answers; records every prompt and notice.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub prompts: Vec<String>,
    pub notices: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
            notices: Vec::new(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front().unwrap_or_default())
    }

    fn notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Confirmed,
    Declined,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationGate {
    /// Operator must type the account alias (or id).
    Prompt,
    /// No prompt; wait out a window during which cancellation aborts.
    Delay(Duration),
}

impl ConfirmationGate {
    #[must_use]
    pub fn from_flags(force: bool, force_sleep: Duration) -> Self {
        if force {
            Self::Delay(force_sleep)
        } else {
            Self::Prompt
        }
    }

    pub fn pass(
        &self,
        account: &AccountContext,
        candidates: usize,
        prompter: &mut dyn Prompter,
        clock: &dyn Clock,
        cancel: &CancelToken,
    ) -> Result<GateOutcome> {
        if cancel.is_cancelled() {
            return Ok(GateOutcome::Cancelled);
        }
        let target = match &account.alias {
            Some(alias) => format!("account {} ({alias})", account.id),
            None => format!("account {}", account.id),
        };
        match self {
            Self::Prompt => {
                let prompt = format!(
                    "About to remove {candidates} resource(s) from {target}.\n\
                     Type {:?} to continue:",
                    account.confirmation_phrase()
                );
                let answer = prompter.ask(&prompt)?;
                if cancel.is_cancelled() {
                    return Ok(GateOutcome::Cancelled);
                }
                if answer.trim() == account.confirmation_phrase() {
                    Ok(GateOutcome::Confirmed)
                } else {
                    Ok(GateOutcome::Declined)
                }
            }
            Self::Delay(window) => {
                prompter.notice(&format!(
                    "Removing {candidates} resource(s) from {target} in {}s; interrupt to abort.",
                    window.as_secs()
                ));
                if sleep_unless_cancelled(clock, *window, cancel) {
                    Ok(GateOutcome::Confirmed)
                } else {
                    Ok(GateOutcome::Cancelled)
                }
            }
        }
    }
}
