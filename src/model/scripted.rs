use std::collections::VecDeque;
use std::sync::Mutex;

use super::{ChatModel, ToolSpec};
use crate::error::{Error, Result};
use crate::turn::Turn;

/// Replays queued replies in order. Used to drive the graph in tests
/// without a network.
///
/// Each call also records how many turns the model was shown, so tests can
/// check what history reached it.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Turn>>>,
    seen: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = Turn>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: Turn) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply));
        }
    }

    /// Queue a failure for the next call.
    pub fn push_error(&self, err: Error) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(err));
        }
    }

    /// History lengths seen by each call so far.
    pub fn seen(&self) -> Vec<usize> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ChatModel for ScriptedModel {
    fn invoke(&self, turns: &[Turn], _tools: &[ToolSpec]) -> Result<Turn> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(turns.len());
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|e| Error::model(format!("lock: {e}")))?;
        replies
            .pop_front()
            .unwrap_or_else(|| Err(Error::model("script exhausted")))
    }
}
