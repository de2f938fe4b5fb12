use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("telegram {method} failed: {description}")]
    Api {
        method: String,
        description: String,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("rpc protocol error: {0}")]
    Protocol(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("rpc transport closed")]
    Closed,
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest renders the full URL, which carries the bot token
        Self::Transport(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        match err {
            tokio_tungstenite::tungstenite::Error::ConnectionClosed
            | tokio_tungstenite::tungstenite::Error::AlreadyClosed => Self::Closed,
            other => Self::Transport(other.to_string()),
        }
    }
}
