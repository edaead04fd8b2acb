use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize preferences: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid transcript line {line}: {message}")]
    Transcript { line: usize, message: String },

    #[error(transparent)]
    Core(#[from] chatstream_core::error::Error),
}
