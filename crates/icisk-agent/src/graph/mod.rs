//! A small state-machine runtime for conversational agents.
//!
//! Nodes read the shared [`GraphState`], return a [`Command`] with a
//! state update and where to go next, and the runner applies the update
//! and follows the routing until a node ends the run.

pub mod context;
pub mod state;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
pub use context::{GraphContext, Interaction, InterruptPrompt};
pub use state::{ChatMessage, GraphState, MessageOp, StateUpdate};

/// Where to go after a node runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Goto {
    /// Jump to a named node, overriding the static edge.
    Node(String),
    /// Follow the static edge out of this node; end if there is none.
    Next,
    /// End the run.
    End,
}

/// What a node returns: a state update plus routing.
#[derive(Debug, Default)]
pub struct Command {
    pub update: StateUpdate,
    pub goto: Goto,
}

impl Default for Goto {
    fn default() -> Self {
        Goto::Next
    }
}

impl Command {
    pub fn goto(node: impl Into<String>) -> Self {
        Self {
            update: StateUpdate::default(),
            goto: Goto::Node(node.into()),
        }
    }

    pub fn end() -> Self {
        Self {
            update: StateUpdate::default(),
            goto: Goto::End,
        }
    }

    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = update;
        self
    }
}

/// A node in the graph.
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    fn run<'a>(
        &'a self,
        state: &'a GraphState,
        ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Command, Error>> + Send + 'a>>;
}

/// Builder for a [`Graph`].
pub struct StateGraph {
    name: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, String>,
    entry: Option<String>,
    max_steps: usize,
}

impl StateGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            max_steps: 32,
        }
    }

    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(node.name().to_string(), node);
        self
    }

    /// Static edge: after `from` runs and returns [`Goto::Next`], go to `to`.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), to.into());
        self
    }

    pub fn entry(mut self, node: impl Into<String>) -> Self {
        self.entry = Some(node.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn compile(self) -> Result<Graph, Error> {
        let entry = self
            .entry
            .ok_or_else(|| Error::Graph(format!("graph '{}' has no entry node", self.name)))?;
        if !self.nodes.contains_key(&entry) {
            return Err(Error::Graph(format!(
                "graph '{}' entry node '{entry}' is not registered",
                self.name
            )));
        }
        for (from, to) in &self.edges {
            if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
                return Err(Error::Graph(format!(
                    "graph '{}' edge '{from}' -> '{to}' references an unknown node",
                    self.name
                )));
            }
        }
        Ok(Graph {
            name: self.name,
            nodes: self.nodes,
            edges: self.edges,
            entry,
            max_steps: self.max_steps,
        })
    }
}

/// A compiled, runnable graph.
pub struct Graph {
    name: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, String>,
    entry: String,
    max_steps: usize,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the graph to completion, mutating `state` in place.
    pub async fn run(&self, state: &mut GraphState, ctx: &GraphContext) -> Result<(), Error> {
        let mut current = self.entry.clone();
        let mut steps = 0usize;

        loop {
            if steps >= self.max_steps {
                return Err(Error::MaxStepsExceeded(self.max_steps));
            }
            steps += 1;

            let node = self.nodes.get(&current).ok_or_else(|| {
                Error::Graph(format!("graph '{}' has no node '{current}'", self.name))
            })?;

            debug!(graph = %self.name, node = %current, step = steps, "running node");
            let command = node.run(state, ctx).await?;
            state.apply(command.update);

            match command.goto {
                Goto::Node(next) => {
                    if !self.nodes.contains_key(&next) {
                        return Err(Error::Graph(format!(
                            "node '{current}' routed to unknown node '{next}'"
                        )));
                    }
                    current = next;
                }
                Goto::Next => match self.edges.get(&current) {
                    Some(next) => current = next.clone(),
                    None => return Ok(()),
                },
                Goto::End => return Ok(()),
            }
        }
    }
}

/// A graph can itself be a node of an enclosing graph. The subgraph
/// runs to its end on the shared state, then the outer graph follows
/// its static edge.
impl Node for Graph {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        state: &'a GraphState,
        ctx: &'a GraphContext,
    ) -> Pin<Box<dyn Future<Output = Result<Command, Error>> + Send + 'a>> {
        Box::pin(async move {
            // The runner mutates state in place, so the subgraph works
            // on a clone and hands the delta back as replacement ops.
            let mut inner = state.clone();
            self.run(&mut inner, ctx).await?;

            let mut update = StateUpdate::default();
            for message in inner.messages {
                update.messages.push(MessageOp::Push(message.clone()));
            }
            for existing in &state.messages {
                if !update
                    .messages
                    .iter()
                    .any(|op| matches!(op, MessageOp::Push(m) if m.id == existing.id))
                {
                    update.messages.push(MessageOp::Remove(existing.id.clone()));
                }
            }
            update.node_history = inner.node_history[state.node_history.len()..].to_vec();
            update.node_params = Some(inner.node_params);
            update.user_id = inner.user_id;

            Ok(Command {
                update,
                goto: Goto::Next,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
    use crate::llm::LlmProvider;
    use crate::store::InMemoryNotebookStore;
    use crate::tool::InterruptKind;

    struct SilentProvider;

    impl LlmProvider for SilentProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, Error> {
            Ok(CompletionResponse {
                content: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            })
        }
    }

    fn test_ctx() -> GraphContext {
        GraphContext::new(
            Arc::new(SilentProvider),
            Arc::new(InMemoryNotebookStore::new()),
            Arc::new(|prompt: InterruptPrompt| {
                Box::pin(async move {
                    assert_ne!(prompt.kind, InterruptKind::InvalidArgs);
                    Ok("ok".to_string())
                })
            }),
        )
    }

    struct StepNode {
        name: String,
        goto: Goto,
    }

    impl StepNode {
        fn new(name: &str, goto: Goto) -> Arc<dyn Node> {
            Arc::new(Self {
                name: name.to_string(),
                goto,
            })
        }
    }

    impl Node for StepNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn run<'a>(
            &'a self,
            _state: &'a GraphState,
            _ctx: &'a GraphContext,
        ) -> Pin<Box<dyn Future<Output = Result<Command, Error>> + Send + 'a>> {
            let goto = self.goto.clone();
            Box::pin(async move {
                Ok(Command {
                    update: StateUpdate::default().visit(&self.name),
                    goto,
                })
            })
        }
    }

    #[tokio::test]
    async fn runs_nodes_along_static_edges() {
        let graph = StateGraph::new("test")
            .add_node(StepNode::new("a", Goto::Next))
            .add_node(StepNode::new("b", Goto::Next))
            .add_edge("a", "b")
            .entry("a")
            .compile()
            .unwrap();

        let mut state = GraphState::default();
        graph.run(&mut state, &test_ctx()).await.unwrap();
        assert_eq!(state.node_history, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn goto_overrides_static_edge() {
        let graph = StateGraph::new("test")
            .add_node(StepNode::new("a", Goto::Node("c".into())))
            .add_node(StepNode::new("b", Goto::Next))
            .add_node(StepNode::new("c", Goto::End))
            .add_edge("a", "b")
            .entry("a")
            .compile()
            .unwrap();

        let mut state = GraphState::default();
        graph.run(&mut state, &test_ctx()).await.unwrap();
        assert_eq!(state.node_history, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn max_steps_guards_against_cycles() {
        let graph = StateGraph::new("test")
            .add_node(StepNode::new("a", Goto::Node("a".into())))
            .entry("a")
            .max_steps(5)
            .compile()
            .unwrap();

        let mut state = GraphState::default();
        let err = graph.run(&mut state, &test_ctx()).await.unwrap_err();
        assert!(matches!(err, Error::MaxStepsExceeded(5)));
    }

    #[tokio::test]
    async fn subgraph_runs_as_node() {
        let inner = StateGraph::new("inner")
            .add_node(StepNode::new("x", Goto::Next))
            .add_node(StepNode::new("y", Goto::End))
            .add_edge("x", "y")
            .entry("x")
            .compile()
            .unwrap();

        let outer = StateGraph::new("outer")
            .add_node(StepNode::new("a", Goto::Next))
            .add_node(Arc::new(inner))
            .add_node(StepNode::new("b", Goto::End))
            .add_edge("a", "inner")
            .add_edge("inner", "b")
            .entry("a")
            .compile()
            .unwrap();

        let mut state = GraphState::default();
        outer.run(&mut state, &test_ctx()).await.unwrap();
        assert_eq!(state.node_history, vec!["a", "x", "y", "b"]);
    }

    #[test]
    fn compile_rejects_missing_entry() {
        let result = StateGraph::new("test")
            .add_node(StepNode::new("a", Goto::End))
            .compile();
        assert!(result.is_err());
    }

    #[test]
    fn compile_rejects_dangling_edge() {
        let result = StateGraph::new("test")
            .add_node(StepNode::new("a", Goto::End))
            .add_edge("a", "missing")
            .entry("a")
            .compile();
        assert!(result.is_err());
    }
}
