//! Graph nodes: the chatbot front-end and the tool handler/interrupt
//! pairs that drive guarded tool execution.

pub mod chatbot;
pub mod tool_handler;
pub mod tool_interrupt;

pub use chatbot::{ChatbotNode, UpdateMessagesNode};
pub use tool_handler::{InterruptState, ToolHandlerNode};
pub use tool_interrupt::ToolInterruptNode;
