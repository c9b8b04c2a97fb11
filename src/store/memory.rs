use std::collections::HashMap;
use std::sync::Mutex;

use super::{Checkpoint, Checkpointer};
use crate::error::{Error, Result};

/// In-process store. Nothing survives a restart; meant for tests and
/// throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    sessions: HashMap<String, Checkpoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| Error::store(format!("lock: {e}")))
    }
}

impl Checkpointer for MemoryStore {
    fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.order.clone())
    }

    fn load(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.lock()?.sessions.get(session_id).cloned())
    }

    fn save(&self, session_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.sessions.get(session_id) {
            Some(stored) if checkpoint.turns.len() < stored.turns.len() => {
                return Err(Error::store(format!(
                    "session {session_id}: history is append-only ({} stored, {} given)",
                    stored.turns.len(),
                    checkpoint.turns.len()
                )));
            }
            Some(stored) => {
                if let Some(seq) = stored
                    .turns
                    .iter()
                    .zip(&checkpoint.turns)
                    .position(|(old, new)| old != new)
                {
                    return Err(Error::store(format!(
                        "session {session_id}: history is append-only (turn {seq} differs)"
                    )));
                }
            }
            None => inner.order.push(session_id.to_string()),
        }
        inner
            .sessions
            .insert(session_id.to_string(), checkpoint.clone());
        Ok(())
    }
}
