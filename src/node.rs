use crate::ctx::Ctx;
use crate::error::Error;
use crate::turn::Turn;

/// The result of running a step: a new state plus what to do next.
pub type StepResult = Result<(ChatState, Outcome), Error>;

/// The state threaded through the graph: a session's turns in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub turns: Vec<Turn>,
}

impl ChatState {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// One step of the chat graph.
///
/// Implement this trait and register the node into a [`crate::Graph`].
pub trait Node: 'static {
    /// A unique name for this node, used for edges and [`Outcome::Next`].
    fn name(&self) -> &'static str;

    /// Run one step. Returns the updated state and an [`Outcome`] that tells
    /// the runtime what to do next.
    fn run(&mut self, state: ChatState, ctx: &mut Ctx) -> StepResult;
}

/// Control flow for the runtime.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Follow the node's branch or default edge.
    Continue,
    /// This pass is complete.
    Done,
    /// Jump to a specific node by name.
    Next(&'static str),
    /// Re-run the current node (counted against `max_retries`).
    Retry(RetryHint),
    /// Stop with an error.
    Fail(String),
}

/// Why a node asked to be re-run.
#[derive(Debug, Clone)]
pub struct RetryHint {
    pub reason: String,
}

impl RetryHint {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
