//! The interactive prompt loop.
//!
//! Generic over its input and output so the whole conversation flow can be
//! driven from tests.

use std::io::{BufRead, Write};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::nodes::chat_graph;
use crate::runtime::{Runtime, Snapshot};
use crate::session::SessionManager;
use crate::store::{Checkpointer, SqliteStore};
use crate::tools::ToolBox;
use crate::turn::Turn;

/// What the user picked at the session prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Zero-based index into the listed sessions.
    Existing(usize),
    New,
    /// Re-prompt with this message.
    Invalid(&'static str),
}

/// Parse a 1-based session choice or `N`/`n`.
pub fn parse_selection(input: &str, count: usize) -> Selection {
    let input = input.trim();
    if input.eq_ignore_ascii_case("n") {
        return Selection::New;
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Selection::Existing(n - 1),
        Ok(_) => Selection::Invalid("Invalid choice, enter a number from the list."),
        Err(_) => Selection::Invalid("Invalid input, enter a number or 'N'."),
    }
}

/// `yes` / `no`, any case. Anything else is `None`.
pub fn parse_approval(input: &str) -> Option<bool> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("yes") {
        Some(true)
    } else if input.eq_ignore_ascii_case("no") {
        Some(false)
    } else {
        None
    }
}

/// Whether the loop should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Repl<R, W> {
    sessions: SessionManager,
    runtime: Runtime,
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> Repl<R, W> {
    pub fn new(sessions: SessionManager, runtime: Runtime, input: R, out: W) -> Self {
        Self {
            sessions,
            runtime,
            input,
            out,
        }
    }

    /// Pick a session, then chat until `/exit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        writeln!(self.out, "chat-line")?;
        writeln!(self.out, "------------------------------------")?;

        let Some(session_id) = self.select_session()? else {
            writeln!(self.out, "Bye!")?;
            return Ok(());
        };

        writeln!(self.out, "\nCurrent session: {session_id}")?;
        writeln!(self.out, "Type '/exit' to quit.")?;
        writeln!(self.out, "------------------------------------")?;

        if let Some(snapshot) = self.runtime.get_state(&session_id)?
            && snapshot.is_paused()
            && self.approve(&session_id, &snapshot)? == Flow::Quit
        {
            writeln!(self.out, "Bye!")?;
            return Ok(());
        }

        loop {
            let Some(line) = self.prompt("You: ")? else {
                break;
            };
            let line = line.trim();
            if line.eq_ignore_ascii_case("/exit") {
                break;
            }
            if line.is_empty() {
                continue;
            }

            let flow = match self.runtime.advance(&session_id, Some(Turn::human(line))) {
                Ok(snapshots) => self.show(&session_id, snapshots)?,
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "advance failed");
                    writeln!(self.out, "Error: {e}")?;
                    Flow::Continue
                }
            };
            if flow == Flow::Quit {
                break;
            }
        }

        writeln!(self.out, "Bye!")?;
        Ok(())
    }

    /// `None` when input ends before a choice is made.
    fn select_session(&mut self) -> Result<Option<String>> {
        let sessions = self.sessions.list_sessions()?;
        if sessions.is_empty() {
            writeln!(self.out, "No saved conversations. Starting a new one.")?;
            return Ok(Some(self.sessions.create_session()));
        }

        loop {
            writeln!(self.out, "Saved conversations:")?;
            for (i, id) in sessions.iter().enumerate() {
                writeln!(self.out, "  {}: {id}", i + 1)?;
            }
            writeln!(self.out, "  N: start a new conversation")?;

            let Some(choice) = self.prompt("Pick a conversation, or N for a new one: ")? else {
                return Ok(None);
            };

            match parse_selection(&choice, sessions.len()) {
                Selection::New => return Ok(Some(self.sessions.create_session())),
                Selection::Existing(idx) => {
                    let id = &sessions[idx];
                    match self.sessions.resume_session(id) {
                        Ok(turns) => {
                            writeln!(self.out, "\n--- Resuming conversation ---")?;
                            for turn in &turns {
                                writeln!(self.out, "{turn}")?;
                            }
                            writeln!(self.out, "--- Conversation loaded ---")?;
                            return Ok(Some(id.clone()));
                        }
                        Err(Error::SessionNotFound(_)) => {
                            writeln!(self.out, "That conversation no longer exists.")?;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Selection::Invalid(msg) => writeln!(self.out, "{msg}")?,
            }
        }
    }

    /// Print what a run produced. Hands over to the approval prompt if the
    /// run paused.
    fn show(&mut self, session_id: &str, snapshots: Vec<Snapshot>) -> Result<Flow> {
        for note in snapshots.iter().flat_map(|s| &s.notes) {
            writeln!(self.out, "  ({note})")?;
        }

        let Some(last) = snapshots.last() else {
            return Ok(Flow::Continue);
        };
        if last.is_paused() {
            return self.approve(session_id, last);
        }
        if let Some(reply) = last.last_reply() {
            writeln!(self.out, "AI: {}", reply.content)?;
        }
        Ok(Flow::Continue)
    }

    fn approve(&mut self, session_id: &str, paused: &Snapshot) -> Result<Flow> {
        writeln!(self.out, "\n--- The agent is paused ---")?;
        for call in paused.pending_calls() {
            writeln!(self.out, "It wants to run: {}", call.name)?;
            writeln!(self.out, "Arguments: {}", call.args)?;
        }

        let approved = loop {
            let Some(answer) = self.prompt("Approve? (yes/no): ")? else {
                return Ok(Flow::Quit);
            };
            if let Some(approved) = parse_approval(&answer) {
                break approved;
            }
        };

        if approved {
            writeln!(self.out, "--- Approved, continuing ---")?;
            match self.runtime.advance(session_id, None) {
                Ok(snapshots) => self.show(session_id, snapshots),
                Err(e) => {
                    writeln!(self.out, "Error: {e}")?;
                    Ok(Flow::Continue)
                }
            }
        } else {
            match self.runtime.reject(session_id, "the user declined") {
                Ok(_) => writeln!(self.out, "--- Declined, nothing was run ---")?,
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "reject failed");
                    writeln!(self.out, "Error: {e}")?;
                }
            }
            Ok(Flow::Continue)
        }
    }

    fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.out, "{label}")?;
        self.out.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Build the runtime a [`Config`] describes on top of `store`.
pub fn build_runtime(config: &Config, store: Arc<dyn Checkpointer>) -> Result<Runtime> {
    let model = config.chat_model()?;
    let tools = Arc::new(ToolBox::builtin(&config.workdir, config.http_timeout));
    let graph = chat_graph(model, tools, config.approve_tools)?;
    Ok(Runtime::new(graph, store)
        .with_max_steps(config.max_steps)
        .with_tracing())
}

/// Run the prompt loop on stdin/stdout against the configured database.
pub fn run_stdio(config: &Config) -> Result<()> {
    let store: Arc<dyn Checkpointer> = Arc::new(SqliteStore::open(&config.db_path)?);
    let runtime = build_runtime(config, store.clone())?;
    let sessions = SessionManager::new(store);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    Repl::new(sessions, runtime, stdin.lock(), stdout.lock()).run()
}
