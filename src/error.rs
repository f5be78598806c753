use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rule resource or environment is missing or malformed. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("RPC {rpc} failed with status {status}")]
    Rpc {
        rpc: String,
        status: u16,
        details: serde_json::Value,
    },
}

pub type Result<T> = std::result::Result<T, ServiceError>;
