use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("function not found: {0}")]
    FunctionNotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("session provisioning failed: {0}")]
    SessionProvision(String),
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
