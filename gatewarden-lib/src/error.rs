use thiserror::Error;

/// Errors that can occur in the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rule store error: {0}")]
    RuleStore(String),

    #[error("Counter store error: {0}")]
    CounterStore(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
