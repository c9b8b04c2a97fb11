//! The chat model behind the `agent` step.
//!
//! The crate never speaks a vendor's API. A model is anything that takes the
//! history plus the tools on offer and returns the next assistant turn.

mod echo;
mod http;
mod scripted;

pub use echo::EchoModel;
pub use http::{HttpModel, HttpModelConfig};
pub use scripted::ScriptedModel;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::turn::Turn;

/// What a model is told about one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object.
    pub parameters: serde_json::Value,
}

pub trait ChatModel: Send + Sync {
    /// Produce the next assistant turn for `turns`.
    fn invoke(&self, turns: &[Turn], tools: &[ToolSpec]) -> Result<Turn>;
}
