//! Operator-facing terminal: transcript echo, turn confirmation and the
//! interactive shell.

use std::io::Write;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use rhai::Dynamic;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::core::transcript::{Observer, Speaker};
use crate::repl::Session;

/// Observer that echoes transcript entries to stderr, coloured by speaker.
pub fn echo_observer() -> Observer {
    Box::new(|text: &str, speaker: Speaker| {
        let styled = match speaker {
            Speaker::System => text.blue(),
            Speaker::Agent => text.red(),
            Speaker::Execution => text.green(),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "{styled}");
        let _ = stderr.flush();
    })
}

/// Line-oriented operator input.
pub trait Console {
    /// Block until the operator accepts the pending turn.
    fn confirm(&mut self, prompt: &str) -> Result<()>;

    /// Read one line; `None` once input is closed.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;

    /// Show session output to the operator.
    fn write(&mut self, text: &str) -> Result<()>;
}

/// Console backed by a line editor on the controlling terminal. The editor
/// is created on first use.
#[derive(Default)]
pub struct TerminalConsole {
    editor: Option<DefaultEditor>,
}

impl TerminalConsole {
    pub fn new() -> Self {
        Self::default()
    }

    fn editor(&mut self) -> Result<&mut DefaultEditor> {
        if self.editor.is_none() {
            self.editor = Some(DefaultEditor::new().context("initialize line editor")?);
        }
        self.editor
            .as_mut()
            .context("line editor unavailable")
    }
}

impl Console for TerminalConsole {
    fn confirm(&mut self, prompt: &str) -> Result<()> {
        self.read_line(prompt)?;
        Ok(())
    }

    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let editor = self.editor()?;
        match editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
            Err(err) => Err(err).context("read console line"),
        }
    }

    fn write(&mut self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes()).context("write console output")?;
        stdout.flush().context("flush console output")
    }
}

/// Let the operator drive `session` by hand until a fragment calls `respond`
/// or input closes. Returns the final answer, if any.
pub fn interactive_shell(session: &mut Session, console: &mut dyn Console) -> Result<Option<Dynamic>> {
    debug!("interactive shell opened");
    let mut incomplete = false;
    loop {
        let prompt = if incomplete { "... " } else { ">>> " };
        let Some(line) = console.read_line(prompt)? else {
            debug!("interactive shell closed");
            return Ok(session.take_final_answer());
        };
        let interaction = session.push_line(&line);
        if !interaction.output.is_empty() {
            console.write(&interaction.output)?;
        }
        incomplete = interaction.incomplete;
        if session.has_final_answer() {
            return Ok(session.take_final_answer());
        }
    }
}
