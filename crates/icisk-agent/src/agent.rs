//! Assembly of the orchestration graph and the conversational
//! front-end around it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::graph::{Graph, GraphContext, GraphState, Node, StateGraph};
use crate::llm::types::Role;
use crate::names;
use crate::nodes::tool_interrupt::CODE_OUTPUT_REVIEW;
use crate::nodes::{ChatbotNode, ToolHandlerNode, ToolInterruptNode, UpdateMessagesNode};
use crate::tool::AgentTool;
use crate::tools::{
    CdsForecastNotebookTool, CdsHistoricNotebookTool, CodeEditorTool, SpiForecastNotebookTool,
};

pub const DEFAULT_MAX_STEPS: usize = 32;

/// A handler/interrupt pair wrapped in its own graph, so it can run as
/// a single node of the enclosing one.
fn tool_subgraph(
    name: &str,
    handler_node: &str,
    interrupt_node: &str,
    tools: Vec<Arc<dyn AgentTool>>,
    interrupt: ToolInterruptNode,
) -> Result<Graph, Error> {
    StateGraph::new(name)
        .add_node(Arc::new(ToolHandlerNode::new(
            handler_node,
            interrupt_node,
            tools,
        )))
        .add_node(Arc::new(interrupt))
        .entry(handler_node)
        .compile()
}

/// Build the full orchestration graph: the chatbot at the center, one
/// subgraph per tool family, and the message-update node for aborted
/// tool runs.
pub fn build_graph(max_steps: usize) -> Result<Graph, Error> {
    let cds_historic: Arc<dyn AgentTool> = Arc::new(CdsHistoricNotebookTool);
    let cds_forecast: Arc<dyn AgentTool> = Arc::new(CdsForecastNotebookTool);
    let spi_forecast: Arc<dyn AgentTool> = Arc::new(SpiForecastNotebookTool);
    let code_editor: Arc<dyn AgentTool> = Arc::new(CodeEditorTool);

    let mut routes = HashMap::new();
    routes.insert(
        names::CDS_HISTORIC_NOTEBOOK_TOOL.to_string(),
        names::CDS_INGESTOR_SUBGRAPH.to_string(),
    );
    routes.insert(
        names::CDS_FORECAST_NOTEBOOK_TOOL.to_string(),
        names::CDS_INGESTOR_SUBGRAPH.to_string(),
    );
    routes.insert(
        names::SPI_FORECAST_NOTEBOOK_TOOL.to_string(),
        names::SPI_CALCULATION_SUBGRAPH.to_string(),
    );
    routes.insert(
        names::CODE_EDITOR_TOOL.to_string(),
        names::CODE_EDITOR_SUBGRAPH.to_string(),
    );

    let chatbot = ChatbotNode::new(
        vec![
            cds_historic.clone(),
            cds_forecast.clone(),
            spi_forecast.clone(),
            code_editor.clone(),
        ],
        routes,
    );

    let cds_ingestor = tool_subgraph(
        names::CDS_INGESTOR_SUBGRAPH,
        names::CDS_INGESTOR_TOOL_HANDLER,
        names::CDS_INGESTOR_TOOL_INTERRUPT,
        vec![cds_historic, cds_forecast],
        ToolInterruptNode::new(names::CDS_INGESTOR_TOOL_INTERRUPT),
    )?;
    let spi_calculation = tool_subgraph(
        names::SPI_CALCULATION_SUBGRAPH,
        names::SPI_CALCULATION_TOOL_HANDLER,
        names::SPI_CALCULATION_TOOL_INTERRUPT,
        vec![spi_forecast],
        ToolInterruptNode::new(names::SPI_CALCULATION_TOOL_INTERRUPT),
    )?;
    let code_editor_subgraph = tool_subgraph(
        names::CODE_EDITOR_SUBGRAPH,
        names::CODE_EDITOR_TOOL_HANDLER,
        names::CODE_EDITOR_TOOL_INTERRUPT,
        vec![code_editor],
        ToolInterruptNode::new(names::CODE_EDITOR_TOOL_INTERRUPT)
            .with_output_review(CODE_OUTPUT_REVIEW),
    )?;

    StateGraph::new(names::GRAPH)
        .add_node(Arc::new(chatbot))
        .add_node(Arc::new(UpdateMessagesNode))
        .add_node(Arc::new(cds_ingestor))
        .add_node(Arc::new(spi_calculation))
        .add_node(Arc::new(code_editor_subgraph))
        .add_edge(names::CHATBOT_UPDATE_MESSAGES, names::CHATBOT)
        .add_edge(names::CDS_INGESTOR_SUBGRAPH, names::CHATBOT)
        .add_edge(names::SPI_CALCULATION_SUBGRAPH, names::CHATBOT)
        .add_edge(names::CODE_EDITOR_SUBGRAPH, names::CHATBOT)
        .entry(names::CHATBOT)
        .max_steps(max_steps)
        .compile()
}

/// A conversation with the agent: the graph plus the state of one
/// user's session.
pub struct Agent {
    graph: Graph,
    ctx: GraphContext,
    state: GraphState,
}

impl Agent {
    pub fn new(ctx: GraphContext, user_id: impl Into<String>) -> Result<Self, Error> {
        Self::with_max_steps(ctx, user_id, DEFAULT_MAX_STEPS)
    }

    pub fn with_max_steps(
        ctx: GraphContext,
        user_id: impl Into<String>,
        max_steps: usize,
    ) -> Result<Self, Error> {
        Ok(Self {
            graph: build_graph(max_steps)?,
            ctx,
            state: GraphState::new(user_id),
        })
    }

    /// Send a user message through the graph and return the agent's
    /// closing reply.
    pub async fn chat(&mut self, text: &str) -> Result<String, Error> {
        self.state.push_user_message(text);
        self.graph.run(&mut self.state, &self.ctx).await?;
        Ok(self
            .state
            .messages
            .iter()
            .rev()
            .find_map(|m| match m.message.role {
                Role::Assistant | Role::System => {
                    let text = m.message.text();
                    (!text.is_empty()).then_some(text)
                }
                Role::User => None,
            })
            .unwrap_or_default())
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }
}
