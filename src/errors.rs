// projectrestore/src/errors.rs
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing {backend} backend")]
    MissingBackendCapability { backend: String },

    #[error("Table data transfer failed: {message}")]
    TransferFailure {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to decode {what}: {source}")]
    DecodeFailure {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage API error: {0}")]
    Platform(String),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Object storage error: {0}")]
    ObjectStorage(String),
}

impl RestoreError {
    pub fn transfer(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        RestoreError::TransferFailure {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        RestoreError::DecodeFailure {
            what: what.into(),
            source,
        }
    }

    // SDK errors carry their detail in the Debug output only.
    pub fn object_storage<E: std::fmt::Debug>(context: impl AsRef<str>, err: E) -> Self {
        RestoreError::ObjectStorage(format!("{}: {:?}", context.as_ref(), err))
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;
