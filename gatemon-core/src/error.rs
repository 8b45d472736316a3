use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid injector spec: {0}")]
    InvalidSpec(String),

    #[error("Malformed data file: {0}")]
    MalformedData(String),

    #[error("Campaign error: {0}")]
    Campaign(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
