use super::{ChatModel, ToolSpec};
use crate::error::Result;
use crate::turn::{Role, Turn};

/// Offline model: repeats the latest human turn back. Never asks for tools.
#[derive(Debug, Default)]
pub struct EchoModel;

impl EchoModel {
    pub fn new() -> Self {
        Self
    }
}

impl ChatModel for EchoModel {
    fn invoke(&self, turns: &[Turn], _tools: &[ToolSpec]) -> Result<Turn> {
        let said = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Human)
            .map(|t| t.content.as_str())
            .unwrap_or_default();
        Ok(Turn::assistant(format!("You said: {said}")))
    }
}
