use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubemendError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient execution error: {0}")]
    TransientExecution(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Fatal configuration error: {0}")]
    FatalConfiguration(String),

    #[error("Reflection failed: {0}")]
    Reflection(String),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Cluster command failed: {0}")]
    Cluster(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Strategy conflict: {0}")]
    Conflict(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, KubemendError>;
