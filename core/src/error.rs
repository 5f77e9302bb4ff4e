use thiserror::Error;

/// Crate-wide error type. Handlers that must never crash the event loop
/// catch this at the dispatch boundary and log instead of propagating.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config file could not be parsed: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("gateway publish failed: {0}")]
    Gateway(String),

    #[error("stream plan error: {0}")]
    Plan(String),

    #[error("metadata fetch error: {0}")]
    Fetch(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
