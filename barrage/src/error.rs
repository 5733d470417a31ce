use barrage_core::InvalidConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] InvalidConfigError),

    #[error("Unable to build the HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Run task ended abnormally: {0}")]
    Join(#[from] tokio::task::JoinError),
}
