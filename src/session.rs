//! Mapping human-chosen session ids to persisted history.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::Checkpointer;
use crate::turn::Turn;

/// Lists, creates and resumes sessions on top of a [`Checkpointer`].
///
/// A session only reaches the store with its first saved step. Ids handed
/// out by [`create_session`](Self::create_session) are remembered so they
/// can be resumed (with empty history) before that happens.
pub struct SessionManager {
    store: Arc<dyn Checkpointer>,
    created: HashSet<String>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Checkpointer>) -> Self {
        Self {
            store,
            created: HashSet::new(),
        }
    }

    /// Every persisted session id, oldest first. Empty on a fresh store.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        self.store.list_sessions()
    }

    /// A new random 128-bit id.
    pub fn create_session(&mut self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session = %id, "created session");
        self.created.insert(id.clone());
        id
    }

    /// The turns recorded so far for `id`.
    pub fn resume_session(&self, id: &str) -> Result<Vec<Turn>> {
        match self.store.load(id)? {
            Some(checkpoint) => {
                tracing::info!(session = %id, turns = checkpoint.turns.len(), "resumed session");
                Ok(checkpoint.turns)
            }
            None if self.created.contains(id) => Ok(Vec::new()),
            None => Err(Error::SessionNotFound(id.to_string())),
        }
    }
}
