use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::types::Message;

/// A message in the graph state, addressable by id.
///
/// Ids make messages replaceable: pushing a message with an existing
/// id overwrites it in place instead of appending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub message: Message,
}

impl ChatMessage {
    pub fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message,
        }
    }

    pub fn with_id(id: impl Into<String>, message: Message) -> Self {
        Self {
            id: id.into(),
            message,
        }
    }
}

/// An operation on the message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum MessageOp {
    /// Append, or replace in place when a message with the same id exists.
    Push(ChatMessage),
    /// Remove the message with this id. No-op when absent.
    Remove(String),
}

/// Shared state threaded through every graph node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    pub messages: Vec<ChatMessage>,
    pub user_id: Option<String>,
    /// Names of nodes visited, appended by each node as it runs.
    pub node_history: Vec<String>,
    /// Scratch space nodes use to pass parameters to each other,
    /// keyed by target node name.
    pub node_params: HashMap<String, serde_json::Value>,
}

impl GraphState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn push_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::new(Message::user(text)));
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Apply a node's update to the state.
    pub fn apply(&mut self, update: StateUpdate) {
        for op in update.messages {
            match op {
                MessageOp::Push(chat_message) => {
                    if let Some(existing) =
                        self.messages.iter_mut().find(|m| m.id == chat_message.id)
                    {
                        *existing = chat_message;
                    } else {
                        self.messages.push(chat_message);
                    }
                }
                MessageOp::Remove(id) => {
                    self.messages.retain(|m| m.id != id);
                }
            }
        }
        self.node_history.extend(update.node_history);
        if let Some(node_params) = update.node_params {
            self.node_params = node_params;
        }
        if update.user_id.is_some() {
            self.user_id = update.user_id;
        }
    }
}

/// Partial state update returned by a node.
///
/// Fields left at their default are not applied: `node_params: None`
/// keeps the current params, `Some(map)` replaces them wholesale.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<MessageOp>,
    pub node_history: Vec<String>,
    pub node_params: Option<HashMap<String, serde_json::Value>>,
    pub user_id: Option<String>,
}

impl StateUpdate {
    pub fn push_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(MessageOp::Push(message));
        self
    }

    pub fn remove_message(mut self, id: impl Into<String>) -> Self {
        self.messages.push(MessageOp::Remove(id.into()));
        self
    }

    pub fn visit(mut self, node: impl Into<String>) -> Self {
        self.node_history.push(node.into());
        self
    }

    pub fn clear_node_params(mut self) -> Self {
        self.node_params = Some(HashMap::new());
        self
    }

    pub fn set_node_params(mut self, params: HashMap<String, serde_json::Value>) -> Self {
        self.node_params = Some(params);
        self
    }
}
