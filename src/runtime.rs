use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ctx::Ctx;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::node::{ChatState, Outcome};
use crate::router::Route;
use crate::store::{Checkpoint, Checkpointer};
use crate::turn::{Role, ToolCall, Turn};

/// Session state after a step, as saved.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub turns: Vec<Turn>,
    /// Step the run is paused in front of.
    pub pending: Option<String>,
    pub step: u64,
    /// Notes the step left for the user. Not persisted.
    pub notes: Vec<String>,
}

impl Snapshot {
    fn new(checkpoint: Checkpoint, notes: Vec<String>) -> Self {
        Self {
            turns: checkpoint.turns,
            pending: checkpoint.pending,
            step: checkpoint.step,
            notes,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pending.is_some()
    }

    /// The tool calls waiting on approval, if paused.
    pub fn pending_calls(&self) -> &[ToolCall] {
        match (&self.pending, self.turns.last()) {
            (Some(_), Some(turn)) => turn.tool_calls.as_slice(),
            _ => &[],
        }
    }

    /// The most recent assistant turn.
    pub fn last_reply(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }
}

/// Passed to the `on_step` hook after each successful node step.
pub struct StepEvent<'a> {
    pub node: &'a str,
    pub outcome: &'a Outcome,
    pub duration: Duration,
    pub step_number: usize,
    pub retries: usize,
}

/// Passed to the `on_error` hook when a node errors or a limit is exceeded.
pub struct ErrorEvent<'a> {
    pub node: &'a str,
    pub error: &'a Error,
    pub step_number: usize,
}

/// Drives a [`Graph`] for one session at a time, checkpointing every step.
pub struct Runtime {
    graph: Graph,
    store: Arc<dyn Checkpointer>,
    max_steps: usize,
    max_retries: usize,
    on_step: Option<Box<dyn FnMut(&StepEvent)>>,
    on_error: Option<Box<dyn FnMut(&ErrorEvent)>>,
}

impl Runtime {
    pub fn new(graph: Graph, store: Arc<dyn Checkpointer>) -> Self {
        Self {
            graph,
            store,
            max_steps: 25,
            max_retries: 2,
            on_step: None,
            on_error: None,
        }
    }

    /// Prevent a model that keeps asking for tools from looping forever.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Register a callback that fires after each successful node step.
    pub fn on_step(mut self, cb: impl FnMut(&StepEvent) + 'static) -> Self {
        self.on_step = Some(Box::new(cb));
        self
    }

    /// Register a callback that fires when a node errors or a limit is exceeded.
    pub fn on_error(mut self, cb: impl FnMut(&ErrorEvent) + 'static) -> Self {
        self.on_error = Some(Box::new(cb));
        self
    }

    /// Set both hooks to report through `tracing`.
    pub fn with_tracing(self) -> Self {
        self.on_step(|e| {
            tracing::debug!(
                step = e.step_number,
                node = e.node,
                outcome = ?e.outcome,
                retries = e.retries,
                elapsed_ms = e.duration.as_millis() as u64,
                "step finished"
            );
        })
        .on_error(|e| {
            tracing::warn!(step = e.step_number, node = e.node, error = %e.error, "step failed");
        })
    }

    /// The last saved state of a session.
    pub fn get_state(&self, session_id: &str) -> Result<Option<Snapshot>> {
        Ok(self
            .store
            .load(session_id)?
            .map(|cp| Snapshot::new(cp, Vec::new())))
    }

    /// Run the graph forward.
    ///
    /// With `Some(input)` the turn is appended to the session (created if
    /// new) and the graph runs from its start. With `None` a paused session
    /// resumes at the step it stopped in front of; a session that is not
    /// paused yields no snapshots. One snapshot is returned per saved step.
    pub fn advance(&mut self, session_id: &str, input: Option<Turn>) -> Result<Vec<Snapshot>> {
        let stored = self.store.load(session_id)?;

        let (mut state, mut step_count, resume_at) = match (stored, input) {
            (Some(cp), Some(_)) if cp.pending.is_some() => {
                return Err(Error::AwaitingApproval(session_id.to_string()));
            }
            (Some(cp), Some(turn)) => {
                let mut turns = cp.turns;
                turns.push(turn);
                (ChatState::new(turns), cp.step, None)
            }
            (Some(cp), None) => {
                let Some(pending) = cp.pending else {
                    return Ok(Vec::new());
                };
                let step = self.graph.step_named(&pending).ok_or_else(|| {
                    Error::invalid(format!("session paused before unknown step '{pending}'"))
                })?;
                (ChatState::new(cp.turns), cp.step, Some(step))
            }
            (None, Some(turn)) => (ChatState::new(vec![turn]), 0, None),
            (None, None) => return Err(Error::SessionNotFound(session_id.to_string())),
        };

        let mut ctx = Ctx::new(session_id);
        let mut snapshots = Vec::new();
        let mut current = resume_at.unwrap_or(self.graph.start());
        let mut resuming = resume_at.is_some();
        let mut retries: usize = 0;
        let mut step_number: usize = 0;
        let mut budget = self.max_steps;

        loop {
            if self.graph.pauses_before(current) && !resuming {
                let checkpoint = Checkpoint {
                    turns: state.turns,
                    pending: Some(current.to_string()),
                    step: step_count,
                };
                self.store.save(session_id, &checkpoint)?;
                tracing::info!(session = session_id, step = current, "paused for approval");
                snapshots.push(Snapshot::new(checkpoint, ctx.take_notes()));
                return Ok(snapshots);
            }

            if budget == 0 {
                return Err(self.out_of_steps(session_id, current, state, step_count, step_number));
            }
            budget -= 1;
            step_number += 1;

            let node = self
                .graph
                .node_mut(current)
                .ok_or_else(|| Error::other(format!("unknown step: {current}")))?;

            let start = Instant::now();
            let result = node.run(state.clone(), &mut ctx);
            let duration = start.elapsed();

            let (next_state, outcome) = match result {
                Err(err) => {
                    self.report_error(current, &err, step_number);
                    return Err(err);
                }
                Ok(step) => step,
            };

            if let Some(cb) = &mut self.on_step {
                cb(&StepEvent {
                    node: current,
                    outcome: &outcome,
                    duration,
                    step_number,
                    retries,
                });
            }

            state = next_state;

            let next = match outcome {
                Outcome::Retry(hint) => {
                    retries += 1;
                    if retries > self.max_retries {
                        let err = Error::other(format!(
                            "step '{}' exceeded max retries ({}): {}",
                            current, self.max_retries, hint.reason
                        ));
                        self.report_error(current, &err, step_number);
                        return Err(err);
                    }
                    resuming = true;
                    continue;
                }
                Outcome::Fail(msg) => {
                    let err = Error::other(msg);
                    self.report_error(current, &err, step_number);
                    return Err(err);
                }
                Outcome::Done => None,
                Outcome::Next(step) => Some(step),
                Outcome::Continue => self.next_after(current, &state)?,
            };

            retries = 0;
            resuming = false;
            step_count += 1;

            let checkpoint = Checkpoint {
                turns: state.turns.clone(),
                pending: None,
                step: step_count,
            };
            self.store.save(session_id, &checkpoint)?;
            snapshots.push(Snapshot::new(checkpoint, ctx.take_notes()));

            match next {
                Some(step) => current = step,
                None => return Ok(snapshots),
            }
        }
    }

    /// The step budget ran out in front of `current`. Tool calls the model
    /// made in the last saved step get an error result so the stored history
    /// never ends on an unanswered call.
    fn out_of_steps(
        &mut self,
        session_id: &str,
        current: &'static str,
        mut state: ChatState,
        step_count: u64,
        step_number: usize,
    ) -> Error {
        let err = Error::other(format!(
            "max_steps exceeded (possible infinite loop) in graph {}",
            self.graph.name()
        ));
        self.report_error(current, &err, step_number);

        let calls = match state.last() {
            Some(turn) if step_number > 0 && turn.has_tool_calls() => turn.tool_calls.clone(),
            _ => return err,
        };
        for call in &calls {
            state.push(Turn::tool_result(call, "error: step limit reached"));
        }
        let checkpoint = Checkpoint {
            turns: state.turns,
            pending: None,
            step: step_count,
        };
        match self.store.save(session_id, &checkpoint) {
            Ok(()) => {
                tracing::warn!(
                    session = session_id,
                    calls = calls.len(),
                    "step limit reached with tool calls unanswered"
                );
                err
            }
            Err(save_err) => save_err,
        }
    }

    /// Decline the tool calls a paused session is waiting on. Each call gets
    /// a result turn saying so, and the pause is cleared.
    pub fn reject(&mut self, session_id: &str, reason: &str) -> Result<Snapshot> {
        let mut checkpoint = self
            .store
            .load(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        if checkpoint.pending.is_none() {
            return Err(Error::invalid(format!(
                "session {session_id} is not waiting for approval"
            )));
        }

        let calls = checkpoint
            .turns
            .last()
            .map(|t| t.tool_calls.clone())
            .unwrap_or_default();
        for call in &calls {
            checkpoint
                .turns
                .push(Turn::tool_result(call, format!("rejected by user: {reason}")));
        }
        checkpoint.pending = None;

        self.store.save(session_id, &checkpoint)?;
        tracing::info!(session = session_id, calls = calls.len(), "tool calls rejected");
        Ok(Snapshot::new(checkpoint, Vec::new()))
    }

    fn next_after(&self, current: &'static str, state: &ChatState) -> Result<Option<&'static str>> {
        if let Some(branch) = self.graph.branch(current) {
            return Ok(match (branch.router)(&state.turns) {
                Route::Continue => Some(branch.target),
                Route::Stop => None,
            });
        }
        if let Some(next) = self.graph.default_next(current) {
            return Ok(Some(next));
        }
        Err(Error::other(format!(
            "step '{current}' returned Continue but no default next step is configured"
        )))
    }

    fn report_error(&mut self, node: &str, error: &Error, step_number: usize) {
        if let Some(cb) = &mut self.on_error {
            cb(&ErrorEvent {
                node,
                error,
                step_number,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatModel, ScriptedModel, ToolSpec};
    use crate::node::{Node, StepResult};
    use crate::nodes::chat_graph;
    use crate::store::MemoryStore;
    use crate::tools::{Tool, ToolBox, str_arg};
    use serde_json::json;
    use std::sync::Mutex;

    struct Upper;
    impl Tool for Upper {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "upper".into(),
                description: "Uppercase text.".into(),
                parameters: json!({"type": "object"}),
            }
        }
        fn call(&self, args: &serde_json::Value) -> Result<String> {
            Ok(str_arg(args, "text")?.to_uppercase())
        }
    }

    fn upper_call() -> Turn {
        Turn::assistant_with_calls("", vec![ToolCall::new("upper", json!({"text": "hi"}))])
    }

    fn setup(
        replies: Vec<Turn>,
        approve: bool,
    ) -> (Arc<ScriptedModel>, Arc<MemoryStore>, Runtime) {
        let model = Arc::new(ScriptedModel::new(replies));
        let store = Arc::new(MemoryStore::new());
        let tools = Arc::new(ToolBox::new().with(Upper));
        let graph = chat_graph(model.clone(), tools, approve).unwrap();
        let runtime = Runtime::new(graph, store.clone());
        (model, store, runtime)
    }

    #[test]
    fn plain_reply_takes_one_step() {
        let (_, store, mut rt) = setup(vec![Turn::assistant("hello")], false);

        let snaps = rt.advance("s1", Some(Turn::human("hi"))).unwrap();
        assert_eq!(snaps.len(), 1);
        let last = snaps.last().unwrap();
        assert_eq!(last.turns.len(), 2);
        assert_eq!(last.last_reply().unwrap().content, "hello");
        assert!(!last.is_paused());

        assert_eq!(store.list_sessions().unwrap(), vec!["s1"]);
    }

    #[test]
    fn tool_call_loops_back_to_agent() {
        let (model, _, mut rt) = setup(vec![upper_call(), Turn::assistant("HI it is")], false);

        let snaps = rt.advance("s1", Some(Turn::human("shout hi"))).unwrap();
        // agent -> tools -> agent
        assert_eq!(snaps.len(), 3);
        let turns = &snaps[2].turns;
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2].role, Role::Tool);
        assert_eq!(turns[2].content, "HI");
        assert_eq!(snaps[1].notes.len(), 1);
        assert_eq!(model.seen(), vec![1, 3]);
        assert_eq!(snaps[2].step, 3);
    }

    #[test]
    fn history_is_replayed_on_next_input() {
        let (model, _, mut rt) = setup(
            vec![Turn::assistant("first"), Turn::assistant("second")],
            false,
        );
        rt.advance("s1", Some(Turn::human("one"))).unwrap();
        rt.advance("s1", Some(Turn::human("two"))).unwrap();
        assert_eq!(model.seen(), vec![1, 3]);
        assert_eq!(rt.get_state("s1").unwrap().unwrap().turns.len(), 4);
    }

    #[test]
    fn pauses_before_tools_until_approved() {
        let (model, _, mut rt) = setup(vec![upper_call(), Turn::assistant("done")], true);

        let snaps = rt.advance("s1", Some(Turn::human("shout"))).unwrap();
        let paused = snaps.last().unwrap();
        assert!(paused.is_paused());
        assert_eq!(paused.pending.as_deref(), Some("tools"));
        assert_eq!(paused.pending_calls()[0].name, "upper");

        let state = rt.get_state("s1").unwrap().unwrap();
        assert!(state.is_paused());

        let resumed = rt.advance("s1", None).unwrap();
        assert_eq!(resumed.len(), 2);
        let last = resumed.last().unwrap();
        assert!(!last.is_paused());
        assert_eq!(last.last_reply().unwrap().content, "done");
        assert_eq!(model.seen(), vec![1, 3]);
    }

    #[test]
    fn new_input_while_paused_is_refused() {
        let (_, _, mut rt) = setup(vec![upper_call()], true);
        rt.advance("s1", Some(Turn::human("shout"))).unwrap();
        let err = rt.advance("s1", Some(Turn::human("again"))).unwrap_err();
        assert!(matches!(err, Error::AwaitingApproval(id) if id == "s1"));
    }

    #[test]
    fn reject_answers_pending_calls_and_unpauses() {
        let (_, _, mut rt) = setup(vec![upper_call(), Turn::assistant("ok then")], true);
        rt.advance("s1", Some(Turn::human("shout"))).unwrap();

        let snap = rt.reject("s1", "not now").unwrap();
        assert!(!snap.is_paused());
        let last = snap.turns.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.content, "rejected by user: not now");

        // Nothing left to resume, and new input is accepted again.
        assert!(rt.advance("s1", None).unwrap().is_empty());
        let snaps = rt.advance("s1", Some(Turn::human("fine"))).unwrap();
        assert_eq!(snaps.last().unwrap().last_reply().unwrap().content, "ok then");
    }

    #[test]
    fn reject_without_pause_is_invalid() {
        let (_, _, mut rt) = setup(vec![Turn::assistant("hello")], true);
        rt.advance("s1", Some(Turn::human("hi"))).unwrap();
        assert!(matches!(rt.reject("s1", "no"), Err(Error::Invalid(_))));
        assert!(matches!(rt.reject("nope", "no"), Err(Error::SessionNotFound(_))));
    }

    #[test]
    fn failed_model_call_persists_nothing() {
        let (_, store, mut rt) = setup(vec![], false);
        let err = rt.advance("s1", Some(Turn::human("hi"))).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn transient_failure_is_retried() {
        let (model, _, mut rt) = setup(vec![], false);
        model.push_error(Error::transient("503"));
        model.push(Turn::assistant("recovered"));

        let snaps = rt.advance("s1", Some(Turn::human("hi"))).unwrap();
        assert_eq!(snaps.last().unwrap().last_reply().unwrap().content, "recovered");
    }

    #[test]
    fn retries_are_bounded() {
        let (model, _, rt) = setup(vec![], false);
        for _ in 0..3 {
            model.push_error(Error::transient("503"));
        }
        let mut rt = rt.with_max_retries(1);
        let err = rt.advance("s1", Some(Turn::human("hi"))).unwrap_err();
        assert!(err.to_string().contains("exceeded max retries"));
    }

    #[test]
    fn max_steps_stops_runaway_tool_loops() {
        let replies: Vec<Turn> = (0..10).map(|_| upper_call()).collect();
        let (_, _, rt) = setup(replies, false);

        let count = Arc::new(Mutex::new(0usize));
        let count_clone = Arc::clone(&count);
        let mut rt = rt.with_max_steps(4).on_error(move |e| {
            assert!(e.error.to_string().contains("max_steps exceeded"));
            *count_clone.lock().unwrap() += 1;
        });

        assert!(rt.advance("s1", Some(Turn::human("loop"))).is_err());
        assert_eq!(*count.lock().unwrap(), 1);
        // Completed steps were kept.
        assert_eq!(rt.get_state("s1").unwrap().unwrap().step, 4);
    }

    #[test]
    fn max_steps_answers_calls_left_by_last_agent_step() {
        let replies: Vec<Turn> = (0..20).map(|_| upper_call()).collect();
        let (_, store, rt) = setup(replies, false);
        let mut rt = rt.with_max_steps(5);

        let err = rt.advance("s1", Some(Turn::human("loop"))).unwrap_err();
        assert!(err.to_string().contains("max_steps exceeded"));

        let saved = store.load("s1").unwrap().unwrap();
        assert!(saved.pending.is_none());
        assert_eq!(saved.step, 5);
        let last = saved.turns.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.content, "error: step limit reached");
        // Every call in the history has a result.
        let calls: usize = saved.turns.iter().map(|t| t.tool_calls.len()).sum();
        let results = saved.turns.iter().filter(|t| t.role == Role::Tool).count();
        assert_eq!(calls, results);

        // Nothing is left waiting, so new input is accepted.
        let again = rt.advance("s1", Some(Turn::human("stop")));
        assert!(!matches!(again, Err(Error::AwaitingApproval(_))));
    }

    #[test]
    fn pause_wins_over_an_exhausted_budget() {
        let (_, store, rt) = setup(vec![upper_call(), Turn::assistant("done")], true);
        let mut rt = rt.with_max_steps(1);

        let snaps = rt.advance("s1", Some(Turn::human("shout"))).unwrap();
        assert!(snaps.last().unwrap().is_paused());
        assert_eq!(store.load("s1").unwrap().unwrap().pending.as_deref(), Some("tools"));

        // Approving spends the single step on the tools node.
        assert!(rt.advance("s1", None).is_err());
        let saved = store.load("s1").unwrap().unwrap();
        assert!(saved.pending.is_none());
        assert_eq!(saved.turns.last().unwrap().content, "HI");
    }

    #[test]
    fn fail_outcome_reaches_on_error() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let hits_clone = Arc::clone(&hits);
        let graph = Graph::builder("test").register(Refuse).build().unwrap();
        let mut rt = runtime_for(graph).on_error(move |e| {
            hits_clone
                .lock()
                .unwrap()
                .push((e.node.to_string(), e.error.to_string()));
        });

        assert!(rt.advance("s", Some(Turn::human("go"))).is_err());
        assert_eq!(*hits.lock().unwrap(), vec![("refuse".to_string(), "reason".to_string())]);
    }

    #[test]
    fn resume_unknown_session_fails() {
        let (_, _, mut rt) = setup(vec![], false);
        assert!(matches!(
            rt.advance("nope", None),
            Err(Error::SessionNotFound(_))
        ));
        assert!(rt.get_state("nope").unwrap().is_none());
    }

    #[test]
    fn on_step_sees_each_node() {
        let (_, _, rt) = setup(vec![upper_call(), Turn::assistant("done")], false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let mut rt = rt.on_step(move |e| {
            seen_clone
                .lock()
                .unwrap()
                .push((e.node.to_string(), e.step_number));
        });

        rt.advance("s1", Some(Turn::human("go"))).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("agent".to_string(), 1),
                ("tools".to_string(), 2),
                ("agent".to_string(), 3)
            ]
        );
    }

    // --- outcomes other than Continue ---

    struct Jump;
    impl Node for Jump {
        fn name(&self) -> &'static str {
            "jump"
        }
        fn run(&mut self, mut state: ChatState, _ctx: &mut Ctx) -> StepResult {
            state.push(Turn::assistant("jumped"));
            Ok((state, Outcome::Next("finish")))
        }
    }

    struct Finish;
    impl Node for Finish {
        fn name(&self) -> &'static str {
            "finish"
        }
        fn run(&mut self, mut state: ChatState, _ctx: &mut Ctx) -> StepResult {
            state.push(Turn::assistant("finished"));
            Ok((state, Outcome::Done))
        }
    }

    struct Dangling;
    impl Node for Dangling {
        fn name(&self) -> &'static str {
            "dangling"
        }
        fn run(&mut self, state: ChatState, _ctx: &mut Ctx) -> StepResult {
            Ok((state, Outcome::Continue))
        }
    }

    struct Refuse;
    impl Node for Refuse {
        fn name(&self) -> &'static str {
            "refuse"
        }
        fn run(&mut self, state: ChatState, _ctx: &mut Ctx) -> StepResult {
            Ok((state, Outcome::Fail("reason".into())))
        }
    }

    fn runtime_for(graph: Graph) -> Runtime {
        Runtime::new(graph, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn next_jumps_and_done_ends() {
        let graph = Graph::builder("test")
            .register(Jump)
            .register(Finish)
            .build()
            .unwrap();
        let snaps = runtime_for(graph)
            .advance("s", Some(Turn::human("go")))
            .unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[1].turns.last().unwrap().content, "finished");
    }

    #[test]
    fn continue_without_edge_errors() {
        let graph = Graph::builder("test").register(Dangling).build().unwrap();
        let err = runtime_for(graph)
            .advance("s", Some(Turn::human("go")))
            .unwrap_err();
        assert!(err.to_string().contains("no default next step"));
    }

    #[test]
    fn fail_outcome_returns_error() {
        let graph = Graph::builder("test").register(Refuse).build().unwrap();
        let err = runtime_for(graph)
            .advance("s", Some(Turn::human("go")))
            .unwrap_err();
        assert_eq!(err.to_string(), "reason");
    }

    #[test]
    fn scripted_model_is_a_chat_model() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new([Turn::assistant("x")]));
        assert_eq!(model.invoke(&[], &[]).unwrap().content, "x");
    }
}
