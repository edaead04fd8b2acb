use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conversation update failed: {0}")]
    Update(String),
}
