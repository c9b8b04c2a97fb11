//! Tools the model can ask for, and the registry that runs them.

pub mod file;
pub mod http;

pub use file::{ReadFile, WriteFile, read_file, write_file};
pub use http::{FetchUrl, http_get};

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::ToolSpec;
use crate::turn::{ToolCall, Turn};

pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    /// Run with the model-supplied argument object.
    fn call(&self, args: &serde_json::Value) -> Result<String>;
}

/// Pull a required string argument out of a tool's argument object.
pub fn str_arg<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::invalid(format!("missing string argument `{key}`")))
}

/// The set of tools offered to the model.
#[derive(Default)]
pub struct ToolBox {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// `fetch_url`, `read_file` and `write_file`, with file paths resolved
    /// under `root`.
    pub fn builtin(root: impl Into<PathBuf>, http_timeout: Duration) -> Self {
        let root = root.into();
        Self::new()
            .with(FetchUrl::new(http_timeout))
            .with(ReadFile::new(root.clone()))
            .with(WriteFile::new(root))
    }

    pub fn with<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run `call` and wrap the outcome as a tool-result turn. Failures become
    /// the turn's content so the model can see and react to them.
    pub fn execute(&self, call: &ToolCall) -> Turn {
        let outcome = match self.tools.iter().find(|t| t.spec().name == call.name) {
            Some(tool) => tool.call(&call.args),
            None => Err(Error::tool(format!("unknown tool `{}`", call.name))),
        };
        match outcome {
            Ok(output) => {
                tracing::debug!(tool = %call.name, bytes = output.len(), "tool finished");
                Turn::tool_result(call, output)
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool failed");
                Turn::tool_result(call, format!("error: {e}"))
            }
        }
    }
}
