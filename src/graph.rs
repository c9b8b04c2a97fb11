use crate::error::GraphError;
use crate::node::Node;
use crate::router::Route;
use crate::turn::Turn;
use std::collections::{HashMap, HashSet};

/// Picks a [`Route`] from the turns accumulated so far.
pub type RouterFn = fn(&[Turn]) -> Route;

/// A conditional edge: `Continue` goes to `target`, `Stop` ends the pass.
#[derive(Clone, Copy)]
pub(crate) struct Branch {
    pub(crate) router: RouterFn,
    pub(crate) target: &'static str,
}

// ---------------------------------------------------------------------------
// GraphBuilder
// ---------------------------------------------------------------------------

pub struct GraphBuilder {
    name: &'static str,
    start: Option<&'static str>,
    chain_last: Option<&'static str>,
    nodes: HashMap<&'static str, Box<dyn Node>>,
    default_next: HashMap<&'static str, &'static str>,
    branches: HashMap<&'static str, Branch>,
    interrupt_before: HashSet<&'static str>,
    duplicate: Option<&'static str>,
}

impl GraphBuilder {
    pub fn register<N: Node>(mut self, node: N) -> Self {
        let name = node.name();
        if self.nodes.contains_key(name) {
            self.duplicate = Some(name);
        }
        self.nodes.insert(name, Box::new(node));

        // The first node registered is the start unless start_at says otherwise.
        if self.start.is_none() {
            self.start = Some(name);
        }
        if self.chain_last.is_none() {
            self.chain_last = Some(name);
        }

        self
    }

    pub fn start_at(mut self, step: &'static str) -> Self {
        self.start = Some(step);
        self.chain_last = Some(step);
        self
    }

    /// Chain the next step: current(chain_last) -> next
    pub fn then(mut self, next: &'static str) -> Self {
        let Some(current) = self.chain_last else {
            self.start = Some(next);
            self.chain_last = Some(next);
            return self;
        };

        self.default_next.insert(current, next);
        self.chain_last = Some(next);
        self
    }

    /// After `from` returns `Continue`, ask `router` where to go. A branch
    /// takes precedence over a default edge from the same node.
    pub fn branch(mut self, from: &'static str, router: RouterFn, target: &'static str) -> Self {
        self.branches.insert(from, Branch { router, target });
        self.chain_last = Some(target);
        self
    }

    /// Pause before running `step` so a human can approve it.
    pub fn interrupt_before(mut self, step: &'static str) -> Self {
        self.interrupt_before.insert(step);
        self
    }

    pub fn build(self) -> Result<Graph, GraphError> {
        if let Some(name) = self.duplicate {
            return Err(GraphError::DuplicateNode(name));
        }

        let start = self.start.ok_or(GraphError::MissingStart)?;

        let known = |step: &'static str| {
            if self.nodes.contains_key(step) {
                Ok(())
            } else {
                Err(GraphError::UnknownStep(step))
            }
        };

        known(start)?;
        for (&from, &to) in &self.default_next {
            known(from)?;
            known(to)?;
        }
        for (&from, branch) in &self.branches {
            known(from)?;
            known(branch.target)?;
        }
        for &step in &self.interrupt_before {
            known(step)?;
        }

        Ok(Graph {
            name: self.name,
            start,
            nodes: self.nodes,
            default_next: self.default_next,
            branches: self.branches,
            interrupt_before: self.interrupt_before,
        })
    }
}

// ---------------------------------------------------------------------------
// Graph (validated, only constructed via build())
// ---------------------------------------------------------------------------

pub struct Graph {
    name: &'static str,
    start: &'static str,
    nodes: HashMap<&'static str, Box<dyn Node>>,
    default_next: HashMap<&'static str, &'static str>,
    branches: HashMap<&'static str, Branch>,
    interrupt_before: HashSet<&'static str>,
}

impl Graph {
    pub fn builder(name: &'static str) -> GraphBuilder {
        GraphBuilder {
            name,
            start: None,
            chain_last: None,
            nodes: HashMap::new(),
            default_next: HashMap::new(),
            branches: HashMap::new(),
            interrupt_before: HashSet::new(),
            duplicate: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // --- used by the runtime ---
    pub(crate) fn start(&self) -> &'static str {
        self.start
    }

    /// Resolves a persisted node name back to the graph's own label.
    pub(crate) fn step_named(&self, name: &str) -> Option<&'static str> {
        self.nodes.get_key_value(name).map(|(&k, _)| k)
    }

    pub(crate) fn node_mut(&mut self, name: &'static str) -> Option<&mut Box<dyn Node>> {
        self.nodes.get_mut(name)
    }

    pub(crate) fn default_next(&self, from: &'static str) -> Option<&'static str> {
        self.default_next.get(from).copied()
    }

    pub(crate) fn branch(&self, from: &'static str) -> Option<Branch> {
        self.branches.get(from).copied()
    }

    pub(crate) fn pauses_before(&self, step: &'static str) -> bool {
        self.interrupt_before.contains(step)
    }
}
