//! Names for the graph components.

pub const GRAPH: &str = "icisk-agent";

pub const CHATBOT: &str = "chatbot";
pub const CHATBOT_UPDATE_MESSAGES: &str = "chatbot_update_messages";

pub const CDS_INGESTOR_SUBGRAPH: &str = "cds_ingestor_subgraph";
pub const CDS_HISTORIC_NOTEBOOK_TOOL: &str = "cds_historic_notebook_tool";
pub const CDS_FORECAST_NOTEBOOK_TOOL: &str = "cds_forecast_notebook_tool";
pub const CDS_INGESTOR_TOOL_HANDLER: &str = "cds_ingestor_tool_handler";
pub const CDS_INGESTOR_TOOL_INTERRUPT: &str = "cds_ingestor_tool_interrupt";

pub const SPI_CALCULATION_SUBGRAPH: &str = "spi_calculation_subgraph";
pub const SPI_FORECAST_NOTEBOOK_TOOL: &str = "spi_forecast_notebook_tool";
pub const SPI_CALCULATION_TOOL_HANDLER: &str = "spi_calculation_tool_handler";
pub const SPI_CALCULATION_TOOL_INTERRUPT: &str = "spi_calculation_tool_interrupt";

pub const CODE_EDITOR_SUBGRAPH: &str = "code_editor_subgraph";
pub const CODE_EDITOR_TOOL: &str = "code_editor_tool";
pub const CODE_EDITOR_TOOL_HANDLER: &str = "code_editor_tool_handler";
pub const CODE_EDITOR_TOOL_INTERRUPT: &str = "code_editor_tool_interrupt";
