use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Max graph steps ({0}) exceeded")]
    MaxStepsExceeded(usize),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Interaction error: {0}")]
    Interaction(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = Error::Api {
            status: 429,
            message: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "API error (429): rate limited");

        let err = Error::MaxStepsExceeded(32);
        assert_eq!(err.to_string(), "Max graph steps (32) exceeded");

        let err = Error::Graph("unknown node 'chatbot'".into());
        assert_eq!(err.to_string(), "Graph error: unknown node 'chatbot'");
    }

    #[test]
    fn error_store_display_message() {
        let err = Error::Store("notebook not found".into());
        assert_eq!(err.to_string(), "Store error: notebook not found");
    }
}
