use thiserror::Error;

pub type CourierResult<T> = Result<T, CourierError>;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile store error: {0}")]
    ProfileStore(String),

    #[error("Content generator error: {0}")]
    Content(String),

    #[error("Rate limit store error: {0}")]
    RateLimitStore(String),

    #[error("Delivery gateway error: {0}")]
    Gateway(String),

    #[error("Campaign error: {0}")]
    Campaign(String),

    #[error("Delivery record error: {0}")]
    Record(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
