//! The two steps of a tool-using chat: ask the model, run what it asked for.

use std::sync::Arc;

use crate::ctx::Ctx;
use crate::error::{Error, GraphError};
use crate::graph::Graph;
use crate::model::{ChatModel, ToolSpec};
use crate::node::{ChatState, Node, Outcome, RetryHint, StepResult};
use crate::router;
use crate::tools::ToolBox;

pub const AGENT: &str = "agent";

/// Calls the model with the whole history and appends its reply.
pub struct AgentNode {
    model: Arc<dyn ChatModel>,
    specs: Vec<ToolSpec>,
}

impl AgentNode {
    pub fn new(model: Arc<dyn ChatModel>, specs: Vec<ToolSpec>) -> Self {
        Self { model, specs }
    }
}

impl Node for AgentNode {
    fn name(&self) -> &'static str {
        AGENT
    }

    fn run(&mut self, mut state: ChatState, _ctx: &mut Ctx) -> StepResult {
        match self.model.invoke(&state.turns, &self.specs) {
            Ok(reply) => {
                state.push(reply);
                Ok((state, Outcome::Continue))
            }
            Err(Error::Transient(reason)) => Ok((state, Outcome::Retry(RetryHint::new(reason)))),
            Err(e) => Err(e),
        }
    }
}

/// Runs every tool call on the last turn, one result turn per call.
pub struct ToolNode {
    tools: Arc<ToolBox>,
}

impl ToolNode {
    pub fn new(tools: Arc<ToolBox>) -> Self {
        Self { tools }
    }
}

impl Node for ToolNode {
    fn name(&self) -> &'static str {
        router::TOOLS
    }

    fn run(&mut self, mut state: ChatState, ctx: &mut Ctx) -> StepResult {
        let calls = match state.last() {
            Some(turn) if turn.has_tool_calls() => turn.tool_calls.clone(),
            _ => return Err(Error::invalid("no tool calls on the last turn")),
        };

        for call in &calls {
            tracing::debug!(session = ctx.session_id(), tool = %call.name, "running tool");
            ctx.note(format!("running {} with {}", call.name, call.args));
            let result = self.tools.execute(call);
            state.push(result);
        }

        Ok((state, Outcome::Continue))
    }
}

/// `agent -> (router) -> tools -> agent`, optionally pausing before `tools`.
pub fn chat_graph(
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolBox>,
    approve_tools: bool,
) -> Result<Graph, GraphError> {
    let mut builder = Graph::builder("chat")
        .register(AgentNode::new(model, tools.specs()))
        .register(ToolNode::new(tools))
        .start_at(AGENT)
        .branch(AGENT, router::decide_last, router::TOOLS)
        .then(AGENT);

    if approve_tools {
        builder = builder.interrupt_before(router::TOOLS);
    }

    builder.build()
}
