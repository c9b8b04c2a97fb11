//! The decision made after every model turn: run tools, or stop.

use crate::turn::Turn;
use std::fmt;

/// Label of the tool-execution step.
pub const TOOLS: &str = "tools";
/// Label that ends the current pass through the graph.
pub const END: &str = "__end__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Dispatch the pending tool calls.
    Continue,
    /// Nothing left to do for this input.
    Stop,
}

impl Route {
    pub fn label(self) -> &'static str {
        match self {
            Self::Continue => TOOLS,
            Self::Stop => END,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `Continue` iff `latest` carries at least one tool call.
pub fn decide(latest: &Turn) -> Route {
    let route = if latest.has_tool_calls() {
        Route::Continue
    } else {
        Route::Stop
    };
    tracing::debug!(role = %latest.role, calls = latest.tool_calls.len(), %route, "routing decision");
    route
}

/// Routes on the last turn of a history. An empty history stops.
pub fn decide_last(turns: &[Turn]) -> Route {
    turns.last().map_or(Route::Stop, decide)
}
