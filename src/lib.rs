//! A tool-using chat agent loop with resumable sessions.
//!
//! A conversation runs through a small [`Graph`]: the `agent` step asks a
//! [`ChatModel`](model::ChatModel) for the next turn, the [`router`] looks at
//! that turn's tool calls and either continues to the `tools` step or stops.
//! Every step is saved through a [`Checkpointer`](store::Checkpointer), so a
//! session can be picked up again later by id with [`SessionManager`].
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use chat_line::{Runtime, SessionManager, Turn};
//! use chat_line::model::EchoModel;
//! use chat_line::nodes::chat_graph;
//! use chat_line::store::MemoryStore;
//! use chat_line::tools::ToolBox;
//!
//! let store = Arc::new(MemoryStore::new());
//! let graph = chat_graph(Arc::new(EchoModel::new()), Arc::new(ToolBox::new()), false).unwrap();
//! let mut runtime = Runtime::new(graph, store.clone());
//! let mut sessions = SessionManager::new(store);
//!
//! let id = sessions.create_session();
//! let snapshots = runtime.advance(&id, Some(Turn::human("hello"))).unwrap();
//! let reply = snapshots.last().unwrap().last_reply().unwrap();
//! assert_eq!(reply.content, "You said: hello");
//!
//! assert_eq!(sessions.resume_session(&id).unwrap().len(), 2);
//! ```

pub mod config;
mod ctx;
mod error;
mod graph;
pub mod model;
mod node;
pub mod nodes;
pub mod repl;
pub mod router;
mod runtime;
mod session;
pub mod store;
pub mod tools;
mod turn;

pub use config::{Args, Config};
pub use ctx::Ctx;
pub use error::{Error, GraphError, Result};
pub use graph::{Graph, GraphBuilder};
pub use node::{ChatState, Node, Outcome, RetryHint, StepResult};
pub use router::{Route, decide};
pub use runtime::{ErrorEvent, Runtime, Snapshot, StepEvent};
pub use session::SessionManager;
pub use turn::{Role, ToolCall, Turn};
