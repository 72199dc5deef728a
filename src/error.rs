use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("player error: {0}")]
    Player(String),

    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("invalid route: {0}")]
    Route(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
