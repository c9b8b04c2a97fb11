//! Persisted session state.
//!
//! A store is a table keyed by session id. Each entry holds the ordered turns
//! of the session plus, when a run is paused for approval, the name of the
//! step it is waiting to run.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::turn::Turn;

/// Everything needed to pick a session back up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    pub turns: Vec<Turn>,
    /// Step the runtime paused in front of, if any.
    pub pending: Option<String>,
    /// Number of graph steps run over the session's lifetime.
    pub step: u64,
}

/// Saves and loads checkpoints by session id.
///
/// `save` must be atomic: either every new turn and the pending marker are
/// stored, or nothing is. Turns are append-only: a checkpoint must start
/// with exactly the turns already stored, or it is rejected.
pub trait Checkpointer: Send + Sync {
    /// Session ids in the order they were first saved.
    fn list_sessions(&self) -> Result<Vec<String>>;

    fn load(&self, session_id: &str) -> Result<Option<Checkpoint>>;

    fn save(&self, session_id: &str, checkpoint: &Checkpoint) -> Result<()>;
}
